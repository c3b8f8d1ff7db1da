use std::collections::BTreeMap;
use linked_hash_map::LinkedHashMap;
use crate::cloudwatch::{DataPoint, MetricQuery, MetricSource};
use crate::debug_note;
use crate::tools::{round2, ReportError};

///One named line on a chart. Points are keyed by timestamp so merges from
///several queries land on a common time axis.
#[derive(Debug, Clone, Default)]
pub struct TimeSeries {
    pub points: BTreeMap<i64, f64>,
}

impl TimeSeries {
    pub fn upsert(&mut self, timestamp_ms: i64, value: f64) {
        self.points.insert(timestamp_ms, value);
    }

    pub fn add(&mut self, timestamp_ms: i64, value: f64) {
        *self.points.entry(timestamp_ms).or_insert(0.0) += value;
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        round2(self.points.values().sum::<f64>() / self.points.len() as f64)
    }
}

///Insertion-ordered set of series: legends and dataset sections come out in
///the order the plan named them, run after run.
#[derive(Debug, Clone, Default)]
pub struct SeriesSet {
    pub series: LinkedHashMap<String, TimeSeries>,
}

impl SeriesSet {
    pub fn new() -> SeriesSet {
        SeriesSet::default()
    }

    pub fn entry(&mut self, key: &str) -> &mut TimeSeries {
        self.series.entry(key.to_string()).or_insert_with(TimeSeries::default)
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TimeSeries)> {
        self.series.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    ///Each query owns its series (distinct lines per broker, per role)
    Upsert,
    ///Queries accumulate into a shared series (per-topic lag summed into a group total)
    Add,
}

#[derive(Debug, Clone)]
pub struct PlannedSeries {
    pub key: String,
    pub query: MetricQuery,
    pub merge: MergeMode,
}

///A fully resolved fetch plan for one report view. Built from discovery
///results before any statistics call, so tests can assert its shape without
///touching a metric store.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub entity: String,
    pub series: Vec<PlannedSeries>,
}

impl QueryPlan {
    ///One series from one query
    pub fn single(entity: &str, key: &str, query: MetricQuery) -> QueryPlan {
        QueryPlan {
            entity: entity.to_string(),
            series: vec![PlannedSeries {
                key: key.to_string(),
                query,
                merge: MergeMode::Upsert,
            }],
        }
    }

    ///One distinct series per discovered value
    pub fn per_value(
        entity: &str,
        values: &[String],
        make: impl Fn(&str) -> (String, MetricQuery),
    ) -> Result<QueryPlan, ReportError> {
        if values.is_empty() {
            return Err(ReportError::NotFound(format!("no data found for {}", entity)));
        }
        let series = values
            .iter()
            .map(|v| {
                let (key, query) = make(v);
                PlannedSeries {
                    key,
                    query,
                    merge: MergeMode::Upsert,
                }
            })
            .collect();
        Ok(QueryPlan {
            entity: entity.to_string(),
            series,
        })
    }

    ///All queries for the discovered values accumulate into one total series
    pub fn summed(
        entity: &str,
        total_key: &str,
        values: &[String],
        make: impl Fn(&str) -> MetricQuery,
    ) -> Result<QueryPlan, ReportError> {
        if values.is_empty() {
            return Err(ReportError::NotFound(format!("no data found for {}", entity)));
        }
        let series = values
            .iter()
            .map(|v| PlannedSeries {
                key: total_key.to_string(),
                query: make(v),
                merge: MergeMode::Add,
            })
            .collect();
        Ok(QueryPlan {
            entity: entity.to_string(),
            series,
        })
    }
}

///Fetches one query and returns its points in timestamp order
pub async fn fetch(
    source: &dyn MetricSource,
    query: &MetricQuery,
) -> Result<Vec<DataPoint>, ReportError> {
    let mut points = source.get_metric_statistics(query).await?;
    points.sort_by_key(|p| p.timestamp_ms);
    Ok(points)
}

///Runs a plan. A failed fetch drops that series and the run continues; only a
///plan whose every series came up empty is an error.
pub async fn execute(
    source: &dyn MetricSource,
    plan: &QueryPlan,
) -> Result<SeriesSet, ReportError> {
    let mut set = SeriesSet::new();
    for planned in &plan.series {
        let points = match fetch(source, &planned.query).await {
            Ok(points) => points,
            Err(e) => {
                debug_note!("skipping series '{}' of {}: {}", planned.key, plan.entity, e);
                eprintln!("Warning: no data for {} ({})", planned.key, e);
                continue;
            }
        };
        if points.is_empty() {
            continue;
        }
        let series = set.entry(&planned.key);
        for p in &points {
            match planned.merge {
                MergeMode::Upsert => series.upsert(p.timestamp_ms, p.avg_or_zero()),
                MergeMode::Add => series.add(p.timestamp_ms, p.avg_or_zero()),
            }
        }
    }
    if set.is_empty() {
        return Err(ReportError::Assembly(format!(
            "no data found for {}",
            plan.entity
        )));
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudwatch::test_support::{avg_point, FakeSource};
    use crate::cloudwatch::Stat;

    fn query(metric: &str) -> MetricQuery {
        MetricQuery {
            namespace: "AWS/Kafka".to_string(),
            metric_name: metric.to_string(),
            dimensions: vec![],
            start_ms: 0,
            end_ms: 3_600_000,
            period: 60,
            statistics: vec![Stat::Average],
        }
    }

    #[tokio::test]
    async fn additive_merge_sums_aligned_points() {
        let source = FakeSource::new()
            .with_points("TopicA", vec![avg_point(0, 10.0), avg_point(60_000, 5.0)])
            .with_points("TopicB", vec![avg_point(0, 2.5), avg_point(120_000, 1.0)]);
        let plan = QueryPlan {
            entity: "group total".to_string(),
            series: vec![
                PlannedSeries {
                    key: "cg (Total)".to_string(),
                    query: query("TopicA"),
                    merge: MergeMode::Add,
                },
                PlannedSeries {
                    key: "cg (Total)".to_string(),
                    query: query("TopicB"),
                    merge: MergeMode::Add,
                },
            ],
        };
        let set = execute(&source, &plan).await.unwrap();
        let total = &set.series["cg (Total)"];
        assert_eq!(total.points[&0], 12.5);
        assert_eq!(total.points[&60_000], 5.0);
        assert_eq!(total.points[&120_000], 1.0);
    }

    #[tokio::test]
    async fn failed_series_is_skipped_not_fatal() {
        let source = FakeSource::new()
            .with_points("CpuSystem", vec![avg_point(0, 40.0)])
            .failing("ConsumerLag");
        let plan = QueryPlan {
            entity: "cluster".to_string(),
            series: vec![
                PlannedSeries {
                    key: "cpu".to_string(),
                    query: query("CpuSystem"),
                    merge: MergeMode::Upsert,
                },
                PlannedSeries {
                    key: "lag".to_string(),
                    query: query("ConsumerLag"),
                    merge: MergeMode::Upsert,
                },
            ],
        };
        let set = execute(&source, &plan).await.unwrap();
        assert!(set.series.contains_key("cpu"));
        assert!(!set.series.contains_key("lag"));
    }

    #[tokio::test]
    async fn all_series_failing_is_an_error() {
        let source = FakeSource::new().failing("CpuSystem");
        let plan = QueryPlan::single("cluster", "cpu", query("CpuSystem"));
        let err = execute(&source, &plan).await.unwrap_err();
        assert!(err.to_string().contains("no data found for cluster"));
    }

    #[tokio::test]
    async fn fetch_returns_points_in_time_order() {
        let source = FakeSource::new().with_points(
            "CPUUtilization",
            vec![avg_point(120_000, 3.0), avg_point(0, 1.0), avg_point(60_000, 2.0)],
        );
        let points = fetch(&source, &query("CPUUtilization")).await.unwrap();
        let stamps: Vec<i64> = points.iter().map(|p| p.timestamp_ms).collect();
        assert_eq!(stamps, vec![0, 60_000, 120_000]);
    }

    #[test]
    fn empty_discovery_cannot_build_a_plan() {
        let err = QueryPlan::per_value("brokers of prod", &[], |v| {
            ("Broker ".to_string() + v, query("CpuSystem"))
        })
        .unwrap_err();
        assert!(err.to_string().contains("no data found"));

        assert!(QueryPlan::summed("topics of cg", "cg (Total)", &[], |_| query("SumOffsetLag"))
            .is_err());
    }

    #[test]
    fn legend_order_follows_plan_order() {
        let mut set = SeriesSet::new();
        set.entry("Broker 1").upsert(0, 1.0);
        set.entry("Broker 2").upsert(0, 2.0);
        set.entry("Broker 10").upsert(0, 3.0);
        let keys: Vec<&String> = set.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Broker 1", "Broker 2", "Broker 10"]);
    }

    #[test]
    fn mean_rounds_to_two_decimals() {
        let mut s = TimeSeries::default();
        s.upsert(0, 1.0);
        s.upsert(1, 2.0);
        s.upsert(2, 2.0);
        assert_eq!(s.mean(), 1.67);
        assert_eq!(TimeSeries::default().mean(), 0.0);
    }
}
