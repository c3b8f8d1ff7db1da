use async_trait::async_trait;
use aws_sdk_cloudwatch::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_cloudwatch::primitives::DateTime;
use aws_sdk_cloudwatch::types::{Dimension, DimensionFilter, Statistic};
use aws_sdk_cloudwatch::{Client, Config as SdkConfig};
use chrono::{DateTime as ChronoDateTime, Utc};
use crate::config::AwsConfig;
use crate::debug_note;
use crate::tools::ReportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stat {
    Average,
    Maximum,
    Minimum,
}

///One getMetricStatistics-shaped request, fully resolved before any I/O happens
#[derive(Debug, Clone, PartialEq)]
pub struct MetricQuery {
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Vec<(String, String)>,
    pub start_ms: i64,
    pub end_ms: i64,
    pub period: i64,
    pub statistics: Vec<Stat>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    pub timestamp_ms: i64,
    pub average: Option<f64>,
    pub maximum: Option<f64>,
    pub minimum: Option<f64>,
}

impl DataPoint {
    ///Absent statistics count as zero throughout the pipeline
    pub fn avg_or_zero(&self) -> f64 {
        self.average.unwrap_or(0.0)
    }
}

///Report time range, taken verbatim from the CLI in RFC 3339 form
#[derive(Debug, Clone, Copy)]
pub struct Window {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl Window {
    pub fn parse(start: &str, end: &str) -> Result<Window, ReportError> {
        let parse_one = |raw: &str| -> Result<i64, ReportError> {
            ChronoDateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc).timestamp_millis())
                .map_err(|e| {
                    ReportError::NotFound(format!("can't parse time '{}': {}", raw, e))
                })
        };
        let start_ms = parse_one(start)?;
        let end_ms = parse_one(end)?;
        if end_ms <= start_ms {
            return Err(ReportError::NotFound(format!(
                "end time '{}' is not after start time '{}'",
                end, start
            )));
        }
        Ok(Window { start_ms, end_ms })
    }
}

///Seam between aggregation logic and the metric store, so report assembly is
///testable against a scripted fake
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn get_metric_statistics(
        &self,
        query: &MetricQuery,
    ) -> Result<Vec<DataPoint>, ReportError>;

    ///Returns the dimension lists of every metric matching namespace,
    ///metric name and the given dimension filters
    async fn list_metrics(
        &self,
        namespace: &str,
        metric_name: &str,
        filters: &[(String, String)],
    ) -> Result<Vec<Vec<(String, String)>>, ReportError>;
}

pub struct CloudWatchSource {
    client: Client,
}

impl CloudWatchSource {
    pub fn new(aws: &AwsConfig) -> CloudWatchSource {
        let credentials = Credentials::new(
            aws.access_key.clone(),
            aws.secret_key.clone(),
            Some(aws.session_token.clone()),
            None,
            "static",
        );
        let conf = SdkConfig::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(aws.region.clone()))
            .credentials_provider(credentials)
            .build();
        CloudWatchSource {
            client: Client::from_conf(conf),
        }
    }
}

fn to_statistic(s: Stat) -> Statistic {
    match s {
        Stat::Average => Statistic::Average,
        Stat::Maximum => Statistic::Maximum,
        Stat::Minimum => Statistic::Minimum,
    }
}

#[async_trait]
impl MetricSource for CloudWatchSource {
    async fn get_metric_statistics(
        &self,
        query: &MetricQuery,
    ) -> Result<Vec<DataPoint>, ReportError> {
        let mut req = self
            .client
            .get_metric_statistics()
            .namespace(&query.namespace)
            .metric_name(&query.metric_name)
            .start_time(DateTime::from_millis(query.start_ms))
            .end_time(DateTime::from_millis(query.end_ms))
            .period(query.period as i32);
        for (name, value) in &query.dimensions {
            let dim = Dimension::builder().name(name).value(value).build();
            req = req.dimensions(dim);
        }
        for s in &query.statistics {
            req = req.statistics(to_statistic(*s));
        }
        let resp = req.send().await.map_err(|e| {
            ReportError::RemoteCall(format!(
                "getMetricStatistics failed for {}: {}",
                query.metric_name, e
            ))
        })?;

        let points = resp
            .datapoints()
            .iter()
            .map(|dp| DataPoint {
                timestamp_ms: dp
                    .timestamp()
                    .map(|t| t.to_millis().unwrap_or_default())
                    .unwrap_or_default(),
                average: dp.average(),
                maximum: dp.maximum(),
                minimum: dp.minimum(),
            })
            .collect();
        Ok(points)
    }

    async fn list_metrics(
        &self,
        namespace: &str,
        metric_name: &str,
        filters: &[(String, String)],
    ) -> Result<Vec<Vec<(String, String)>>, ReportError> {
        let mut req = self
            .client
            .list_metrics()
            .namespace(namespace)
            .metric_name(metric_name);
        for (name, value) in filters {
            let filter = DimensionFilter::builder().name(name).value(value).build();
            req = req.dimensions(filter);
        }
        let resp = req.send().await.map_err(|e| {
            ReportError::RemoteCall(format!("listMetrics failed for {}: {}", metric_name, e))
        })?;

        let metrics = resp
            .metrics()
            .iter()
            .map(|m| {
                m.dimensions()
                    .iter()
                    .map(|d| {
                        (
                            d.name().unwrap_or_default().to_string(),
                            d.value().unwrap_or_default().to_string(),
                        )
                    })
                    .collect()
            })
            .collect();
        Ok(metrics)
    }
}

///Lists metrics and projects out the distinct values of one target dimension,
///sorted numerically when every value parses as an integer (broker ids come
///back as "1", "2", "10") and lexically otherwise. Empty discovery is Ok -
///callers decide whether absence is an error.
pub async fn discover(
    source: &dyn MetricSource,
    namespace: &str,
    metric_name: &str,
    filters: &[(String, String)],
    target_dimension: &str,
) -> Result<Vec<String>, ReportError> {
    let metrics = source.list_metrics(namespace, metric_name, filters).await?;
    let mut values: Vec<String> = metrics
        .iter()
        .flatten()
        .filter(|(name, _)| name == target_dimension)
        .map(|(_, value)| value.clone())
        .collect();
    //one ordering for the whole set: a per-pair choice is not a total order
    //once numeric and non-numeric values mix
    if !values.is_empty() && values.iter().all(|v| v.parse::<i64>().is_ok()) {
        values.sort_by_key(|v| v.parse::<i64>().unwrap_or_default());
    } else {
        values.sort();
    }
    values.dedup();
    debug_note!(
        "discovered {} value(s) of {} for {}/{}",
        values.len(),
        target_dimension,
        namespace,
        metric_name
    );
    Ok(values)
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    ///Scripted metric store: canned statistics per metric name plus canned
    ///dimension lists, with optional per-metric failure injection.
    pub struct FakeSource {
        pub points: HashMap<String, Vec<DataPoint>>,
        pub listings: HashMap<String, Vec<Vec<(String, String)>>>,
        pub failing_metrics: Vec<String>,
        pub stat_calls: Mutex<Vec<MetricQuery>>,
    }

    impl FakeSource {
        pub fn new() -> FakeSource {
            FakeSource {
                points: HashMap::new(),
                listings: HashMap::new(),
                failing_metrics: Vec::new(),
                stat_calls: Mutex::new(Vec::new()),
            }
        }

        pub fn with_points(mut self, metric: &str, points: Vec<DataPoint>) -> FakeSource {
            self.points.insert(metric.to_string(), points);
            self
        }

        pub fn with_listing(
            mut self,
            metric: &str,
            listing: Vec<Vec<(String, String)>>,
        ) -> FakeSource {
            self.listings.insert(metric.to_string(), listing);
            self
        }

        pub fn failing(mut self, metric: &str) -> FakeSource {
            self.failing_metrics.push(metric.to_string());
            self
        }
    }

    pub fn dims(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    pub fn avg_point(timestamp_ms: i64, average: f64) -> DataPoint {
        DataPoint {
            timestamp_ms,
            average: Some(average),
            maximum: None,
            minimum: None,
        }
    }

    #[async_trait]
    impl MetricSource for FakeSource {
        async fn get_metric_statistics(
            &self,
            query: &MetricQuery,
        ) -> Result<Vec<DataPoint>, ReportError> {
            self.stat_calls.lock().unwrap().push(query.clone());
            if self.failing_metrics.contains(&query.metric_name) {
                return Err(ReportError::RemoteCall(format!(
                    "injected failure for {}",
                    query.metric_name
                )));
            }
            Ok(self
                .points
                .get(&query.metric_name)
                .cloned()
                .unwrap_or_default())
        }

        async fn list_metrics(
            &self,
            _namespace: &str,
            metric_name: &str,
            _filters: &[(String, String)],
        ) -> Result<Vec<Vec<(String, String)>>, ReportError> {
            if self.failing_metrics.contains(&metric_name.to_string()) {
                return Err(ReportError::RemoteCall(format!(
                    "injected listing failure for {}",
                    metric_name
                )));
            }
            Ok(self
                .listings
                .get(metric_name)
                .cloned()
                .unwrap_or_default())
        }
    }
}
