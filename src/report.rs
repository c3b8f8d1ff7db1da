use std::fs;
use chrono::{TimeZone, Utc};
use colored::Colorize;
use linked_hash_map::LinkedHashMap;
use serde::{Deserialize, Serialize};
use crate::charts::save_series_chart;
use crate::cloudwatch::{discover, MetricQuery, MetricSource, Stat, Window};
use crate::config::LogicalRole;
use crate::series::{execute, fetch, MergeMode, PlannedSeries, QueryPlan, SeriesSet};
use crate::tools::{get_timestamp, round2, timestamp_slug, ReportError};
use crate::{debug_note, make_notes};

const RDS_NAMESPACE: &str = "AWS/RDS";
const KAFKA_NAMESPACE: &str = "AWS/Kafka";

///Role dashboards plot every lag signal the brokers publish per group/topic
const LAG_METRICS: [&str; 4] = [
    "SumOffsetLag",
    "MaxOffsetLag",
    "RollingEstimatedTimeLagMax",
    "EstimatedMaxTimeLag",
];

///label, unit, file, chart scale factor
const RDS_CHARTS: [(&str, &str, &str, &str, f64); 5] = [
    ("CPUUtilization", "RDS CPU Utilization", "Percent", "rds_cpu_utilization.html", 1.0),
    ("FreeableMemory", "RDS Freeable Memory (MB)", "Megabytes", "rds_freeable_memory.html", 1.0 / (1024.0 * 1024.0)),
    ("DatabaseConnections", "RDS Database Connections", "Count", "rds_database_connections.html", 1.0),
    ("ReadIOPS", "RDS Read IOPS", "Count/Second", "rds_read_iops.html", 1.0),
    ("WriteIOPS", "RDS Write IOPS", "Count/Second", "rds_write_iops.html", 1.0),
];

const CHART_PERIOD: i64 = 60;
const DATASET_PERIOD: i64 = 300;

pub struct ReportOutcome {
    pub report_dir: String,
    pub summary_path: String,
    pub dataset_path: String,
    pub dataset_json: String,
}

// ---- structured dataset document ----

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportDocument {
    pub report_metadata: ReportMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rds_metrics: Option<RdsSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kafka_metrics: Option<KafkaSection>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub generated_at: String,
    pub time_range: TimeRange,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RdsSection {
    pub db_instance: String,
    pub cpu_utilization: MetricSeriesDoc,
    pub database_connections: MetricSeriesDoc,
    pub freeable_memory: MetricSeriesDoc,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KafkaSection {
    pub cluster_name: String,
    pub consumer_groups: LinkedHashMap<String, ConsumerGroupDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConsumerGroupDoc {
    pub consumer_group: String,
    pub topic: String,
    pub sum_offset_lag: MetricSeriesDoc,
    pub max_offset_lag: MetricSeriesDoc,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetricSeriesDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_range: Option<String>,
    pub unit: String,
    pub data_points: Vec<DataPointDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DataPointDoc {
    pub timestamp: String,
    pub average: f64,
    pub maximum: f64,
    pub minimum: f64,
}

fn iso_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

fn scale_set(set: &mut SeriesSet, factor: f64) {
    if (factor - 1.0).abs() < f64::EPSILON {
        return;
    }
    for (_, series) in set.series.iter_mut() {
        for value in series.points.values_mut() {
            *value *= factor;
        }
    }
}

pub struct ReportAssembler<'a> {
    source: &'a dyn MetricSource,
    roles: &'a [LogicalRole],
    timezone: &'a str,
    quiet: bool,
}

impl<'a> ReportAssembler<'a> {
    pub fn new(
        source: &'a dyn MetricSource,
        roles: &'a [LogicalRole],
        timezone: &'a str,
        quiet: bool,
    ) -> ReportAssembler<'a> {
        ReportAssembler {
            source,
            roles,
            timezone,
            quiet,
        }
    }

    ///Builds the whole report under `out_root`: charts, the ✓/✗ summary and
    ///the structured dataset. Individual views fail independently; the report
    ///itself is produced even when everything inside it failed.
    pub async fn assemble(
        &self,
        cluster: Option<&str>,
        db_instance: Option<&str>,
        window: Window,
        out_root: &str,
    ) -> Result<ReportOutcome, ReportError> {
        let report_dir = format!("{}/comprehensive_report_{}", out_root, timestamp_slug());
        fs::create_dir_all(&report_dir)?;
        let summary_path = format!("{}/report_summary.txt", report_dir);

        make_notes!(&summary_path, self.quiet, "{}\n", "=== Comprehensive Metrics Report ===".bright_cyan());
        make_notes!(&summary_path, self.quiet, "Generated at: {}\n", get_timestamp());
        make_notes!(
            &summary_path,
            self.quiet,
            "Time range: {} - {}\n\n",
            iso_timestamp(window.start_ms),
            iso_timestamp(window.end_ms)
        );

        if let Some(id) = db_instance {
            self.rds_views(id, window, &report_dir, &summary_path).await;
        }
        if let Some(name) = cluster {
            self.kafka_views(name, window, &report_dir, &summary_path).await;
        }

        let document = self.build_dataset(cluster, db_instance, window).await;
        let dataset_json = serde_json::to_string_pretty(&document)?;
        let dataset_path = format!("{}/metrics_vector_data.json", report_dir);
        fs::write(&dataset_path, &dataset_json)?;
        make_notes!(&summary_path, self.quiet, "\nStructured dataset: {}\n", dataset_path);

        Ok(ReportOutcome {
            report_dir,
            summary_path,
            dataset_path,
            dataset_json,
        })
    }

    fn note_result(&self, summary_path: &str, label: &str, result: Result<(), ReportError>) {
        match result {
            Ok(()) => {
                make_notes!(summary_path, self.quiet, "{} Generated {}\n", "✓".bright_green(), label);
            }
            Err(e) => {
                debug_note!("view '{}' failed: {}", label, e);
                make_notes!(
                    summary_path,
                    self.quiet,
                    "{} Error generating {}: {}\n",
                    "✗".bright_red(),
                    label,
                    e
                );
            }
        }
    }

    // ---- RDS resource view ----

    async fn rds_views(&self, db_instance: &str, window: Window, report_dir: &str, summary_path: &str) {
        for (metric, label, unit, file, factor) in RDS_CHARTS {
            let result = self
                .rds_chart(db_instance, window, metric, label, unit, factor, &format!("{}/{}", report_dir, file))
                .await;
            self.note_result(summary_path, &format!("{} chart", label), result);
        }
    }

    async fn rds_chart(
        &self,
        db_instance: &str,
        window: Window,
        metric: &str,
        label: &str,
        unit: &str,
        factor: f64,
        path: &str,
    ) -> Result<(), ReportError> {
        let plan = QueryPlan::single(
            &format!("{} of {}", metric, db_instance),
            label,
            self.rds_query(db_instance, window, metric, CHART_PERIOD, vec![Stat::Average]),
        );
        let mut set = execute(self.source, &plan).await?;
        scale_set(&mut set, factor);
        save_series_chart(&set, label, unit, path, self.timezone);
        Ok(())
    }

    fn rds_query(
        &self,
        db_instance: &str,
        window: Window,
        metric: &str,
        period: i64,
        statistics: Vec<Stat>,
    ) -> MetricQuery {
        MetricQuery {
            namespace: RDS_NAMESPACE.to_string(),
            metric_name: metric.to_string(),
            dimensions: vec![("DBInstanceIdentifier".to_string(), db_instance.to_string())],
            start_ms: window.start_ms,
            end_ms: window.end_ms,
            period,
            statistics,
        }
    }

    // ---- Kafka cluster view ----

    async fn kafka_views(&self, cluster: &str, window: Window, report_dir: &str, summary_path: &str) {
        let result = self.broker_cpu_chart(cluster, window, report_dir).await;
        self.note_result(summary_path, "broker CPU chart", result);

        let result = self.combined_lag_dashboard(cluster, window, report_dir).await;
        self.note_result(summary_path, "combined lag dashboard", result);

        for role in self.roles {
            let result = self
                .role_chart(
                    cluster,
                    window,
                    role,
                    &["SumOffsetLag", "MaxOffsetLag"],
                    &format!("{} offset lag", role.display),
                    "Messages",
                    &format!("{}/kafka_lag_limited_{}.html", report_dir, role.key),
                )
                .await;
            self.note_result(summary_path, &format!("{} offset lag chart", role.display), result);

            let result = self
                .role_chart(
                    cluster,
                    window,
                    role,
                    &["RollingEstimatedTimeLagMax", "EstimatedMaxTimeLag"],
                    &format!("{} time lag", role.display),
                    "Seconds",
                    &format!("{}/kafka_time_lag_{}.html", report_dir, role.key),
                )
                .await;
            self.note_result(summary_path, &format!("{} time lag chart", role.display), result);
        }

        let result = self.consumer_lag_totals_chart(cluster, window, report_dir).await;
        self.note_result(summary_path, "consumer lag totals chart", result);
    }

    fn kafka_query(
        &self,
        window: Window,
        metric: &str,
        dimensions: Vec<(String, String)>,
        period: i64,
        statistics: Vec<Stat>,
    ) -> MetricQuery {
        MetricQuery {
            namespace: KAFKA_NAMESPACE.to_string(),
            metric_name: metric.to_string(),
            dimensions,
            start_ms: window.start_ms,
            end_ms: window.end_ms,
            period,
            statistics,
        }
    }

    async fn broker_cpu_chart(
        &self,
        cluster: &str,
        window: Window,
        report_dir: &str,
    ) -> Result<(), ReportError> {
        let filters = vec![("Cluster Name".to_string(), cluster.to_string())];
        let brokers = discover(self.source, KAFKA_NAMESPACE, "CpuSystem", &filters, "Broker ID").await?;
        let plan = QueryPlan::per_value(&format!("brokers of {}", cluster), &brokers, |id| {
            (
                format!("Broker {}", id),
                self.kafka_query(
                    window,
                    "CpuSystem",
                    vec![
                        ("Cluster Name".to_string(), cluster.to_string()),
                        ("Broker ID".to_string(), id.to_string()),
                    ],
                    CHART_PERIOD,
                    vec![Stat::Average],
                ),
            )
        })?;
        let set = execute(self.source, &plan).await?;
        save_series_chart(
            &set,
            "Kafka Broker CPU (System)",
            "Percent",
            &format!("{}/kafka_broker_cpu.html", report_dir),
            self.timezone,
        );
        Ok(())
    }

    fn role_dimensions(&self, cluster: &str, role: &LogicalRole) -> Vec<(String, String)> {
        vec![
            ("Cluster Name".to_string(), cluster.to_string()),
            ("Consumer Group".to_string(), role.consumer_group.clone()),
            ("Topic".to_string(), role.topic.clone()),
        ]
    }

    async fn combined_lag_dashboard(
        &self,
        cluster: &str,
        window: Window,
        report_dir: &str,
    ) -> Result<(), ReportError> {
        let mut plan = QueryPlan {
            entity: format!("lag dashboard of {}", cluster),
            series: Vec::new(),
        };
        for role in self.roles {
            for metric in LAG_METRICS {
                plan.series.push(PlannedSeries {
                    key: format!("{} - {}", role.display, metric),
                    query: self.kafka_query(
                        window,
                        metric,
                        self.role_dimensions(cluster, role),
                        CHART_PERIOD,
                        vec![Stat::Average],
                    ),
                    merge: MergeMode::Upsert,
                });
            }
        }
        let set = execute(self.source, &plan).await?;
        save_series_chart(
            &set,
            "Kafka Consumer Lag Dashboard",
            "Lag",
            &format!("{}/kafka_combined_dashboard.html", report_dir),
            self.timezone,
        );
        Ok(())
    }

    async fn role_chart(
        &self,
        cluster: &str,
        window: Window,
        role: &LogicalRole,
        metrics: &[&str],
        title: &str,
        unit: &str,
        path: &str,
    ) -> Result<(), ReportError> {
        let mut plan = QueryPlan {
            entity: format!("{} of {}", title, cluster),
            series: Vec::new(),
        };
        for &metric in metrics {
            plan.series.push(PlannedSeries {
                key: metric.to_string(),
                query: self.kafka_query(
                    window,
                    metric,
                    self.role_dimensions(cluster, role),
                    CHART_PERIOD,
                    vec![Stat::Average],
                ),
                merge: MergeMode::Upsert,
            });
        }
        let set = execute(self.source, &plan).await?;
        save_series_chart(&set, title, unit, path, self.timezone);
        Ok(())
    }

    ///Cluster-wide totals: every consumer group the cluster knows, its per-topic
    ///ConsumerLag summed into one "<group> (Total)" line. Discovery failures fail
    ///the view; per-topic fetch failures are absorbed downstream.
    async fn consumer_lag_totals_chart(
        &self,
        cluster: &str,
        window: Window,
        report_dir: &str,
    ) -> Result<(), ReportError> {
        let cluster_filter = vec![("Cluster Name".to_string(), cluster.to_string())];
        let groups = discover(
            self.source,
            KAFKA_NAMESPACE,
            "ConsumerLag",
            &cluster_filter,
            "Consumer Group",
        )
        .await?;
        if groups.is_empty() {
            return Err(ReportError::NotFound(format!(
                "no consumer groups found for {}",
                cluster
            )));
        }

        let mut plan = QueryPlan {
            entity: format!("consumer lag totals of {}", cluster),
            series: Vec::new(),
        };
        for group in &groups {
            let group_filter = vec![
                ("Cluster Name".to_string(), cluster.to_string()),
                ("Consumer Group".to_string(), group.clone()),
            ];
            let topics = discover(
                self.source,
                KAFKA_NAMESPACE,
                "ConsumerLag",
                &group_filter,
                "Topic",
            )
            .await?;
            for topic in &topics {
                plan.series.push(PlannedSeries {
                    key: format!("{} (Total)", group),
                    query: self.kafka_query(
                        window,
                        "ConsumerLag",
                        vec![
                            ("Cluster Name".to_string(), cluster.to_string()),
                            ("Consumer Group".to_string(), group.clone()),
                            ("Topic".to_string(), topic.clone()),
                        ],
                        CHART_PERIOD,
                        vec![Stat::Average],
                    ),
                    merge: MergeMode::Add,
                });
            }
        }
        let set = execute(self.source, &plan).await?;
        save_series_chart(
            &set,
            "Kafka Consumer Lag Totals",
            "Messages",
            &format!("{}/kafka_consumer_lag_totals.html", report_dir),
            self.timezone,
        );
        Ok(())
    }

    // ---- structured dataset ----

    async fn dataset_series(
        &self,
        query: MetricQuery,
        expected_range: Option<&str>,
        unit: &str,
    ) -> MetricSeriesDoc {
        let data_points = match fetch(self.source, &query).await {
            Ok(points) => points
                .iter()
                .map(|p| DataPointDoc {
                    timestamp: iso_timestamp(p.timestamp_ms),
                    average: round2(p.average.unwrap_or(0.0)),
                    maximum: round2(p.maximum.unwrap_or(0.0)),
                    minimum: round2(p.minimum.unwrap_or(0.0)),
                })
                .collect(),
            Err(e) => {
                debug_note!("dataset fetch of {} failed: {}", query.metric_name, e);
                Vec::new()
            }
        };
        MetricSeriesDoc {
            expected_range: expected_range.map(|s| s.to_string()),
            unit: unit.to_string(),
            data_points,
        }
    }

    async fn build_dataset(
        &self,
        cluster: Option<&str>,
        db_instance: Option<&str>,
        window: Window,
    ) -> ReportDocument {
        let all_stats = vec![Stat::Average, Stat::Maximum, Stat::Minimum];

        let rds_metrics = match db_instance {
            Some(id) => Some(RdsSection {
                db_instance: id.to_string(),
                cpu_utilization: self
                    .dataset_series(
                        self.rds_query(id, window, "CPUUtilization", DATASET_PERIOD, all_stats.clone()),
                        Some("40% - 50%"),
                        "percent",
                    )
                    .await,
                database_connections: self
                    .dataset_series(
                        self.rds_query(id, window, "DatabaseConnections", DATASET_PERIOD, all_stats.clone()),
                        Some("2000 - 2500 connections"),
                        "connections",
                    )
                    .await,
                freeable_memory: self
                    .dataset_series(
                        self.rds_query(id, window, "FreeableMemory", DATASET_PERIOD, all_stats.clone()),
                        None,
                        "bytes",
                    )
                    .await,
            }),
            None => None,
        };

        let kafka_metrics = match cluster {
            Some(name) => {
                let mut consumer_groups = LinkedHashMap::new();
                for role in self.roles {
                    let doc = ConsumerGroupDoc {
                        consumer_group: role.consumer_group.clone(),
                        topic: role.topic.clone(),
                        sum_offset_lag: self
                            .dataset_series(
                                self.kafka_query(
                                    window,
                                    "SumOffsetLag",
                                    self.role_dimensions(name, role),
                                    DATASET_PERIOD,
                                    all_stats.clone(),
                                ),
                                None,
                                "messages",
                            )
                            .await,
                        max_offset_lag: self
                            .dataset_series(
                                self.kafka_query(
                                    window,
                                    "MaxOffsetLag",
                                    self.role_dimensions(name, role),
                                    DATASET_PERIOD,
                                    all_stats.clone(),
                                ),
                                None,
                                "messages",
                            )
                            .await,
                    };
                    consumer_groups.insert(role.key.clone(), doc);
                }
                Some(KafkaSection {
                    cluster_name: name.to_string(),
                    consumer_groups,
                })
            }
            None => None,
        };

        ReportDocument {
            report_metadata: ReportMetadata {
                generated_at: get_timestamp(),
                time_range: TimeRange {
                    start: iso_timestamp(window.start_ms),
                    end: iso_timestamp(window.end_ms),
                },
            },
            rds_metrics,
            kafka_metrics,
        }
    }
}
