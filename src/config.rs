use std::env;
use std::time::Duration;
use crate::analysis::PollPolicy;
use crate::tools::{get_safe_filename, ReportError};

///Everything the pipeline needs, read once from the environment (.env included)
///and passed explicitly into each component. No process-wide mutable state.
#[derive(Debug, Clone)]
pub struct Config {
    pub aws: AwsConfig,
    pub ai: AiConfig,
    pub roles: Vec<LogicalRole>,
    pub sandbox: SandboxConfig,
    pub chart_timezone: String,
}

#[derive(Debug, Clone)]
pub struct AwsConfig {
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub session_token: String,
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub username: String,
    pub apikey: String,
    pub send_message_url: String,
    pub status_url: String,
    pub application: String,
    pub max_tokens: u32,
    pub model_type: String,
    pub temperature: f64,
    pub poll: PollPolicy,
}

///One fixed consumer-group/topic pair the cluster view reports on.
///The short key also names the role's section in the structured dataset.
#[derive(Debug, Clone)]
pub struct LogicalRole {
    pub consumer_group: String,
    pub topic: String,
    pub key: String,
    pub display: String,
}

impl LogicalRole {
    pub fn from_pair(consumer_group: &str, topic: &str) -> LogicalRole {
        let cg = consumer_group.to_lowercase();
        let (key, display) = if cg.contains("worker") {
            ("worker".to_string(), "Worker".to_string())
        } else if cg.contains("async") {
            ("async_notify".to_string(), "Async Notify".to_string())
        } else if cg.contains("notify") {
            ("notify".to_string(), "Notify".to_string())
        } else {
            (get_safe_filename(consumer_group), consumer_group.to_string())
        };
        LogicalRole {
            consumer_group: consumer_group.to_string(),
            topic: topic.to_string(),
            key,
            display,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub compiler: String,
    pub runtime: String,
    pub classpath: String,
    pub main_class: String,
    pub timeout: Duration,
}

fn required(name: &str) -> Result<String, ReportError> {
    env::var(name).map_err(|_| {
        ReportError::NotFound(format!("environment variable {} is not set", name))
    })
}

fn optional(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn load() -> Result<Config, ReportError> {
        let aws = AwsConfig {
            region: optional("AWS_REGION", "eu-west-1"),
            access_key: required("AWS_ACCESS_KEY")?,
            secret_key: required("AWS_SECRET_KEY")?,
            session_token: required("AWS_SESSION_TOKEN")?,
        };

        let poll = PollPolicy {
            max_attempts: optional("AI_POLL_MAX_ATTEMPTS", "60")
                .parse()
                .unwrap_or(60),
            interval: Duration::from_secs(
                optional("AI_POLL_INTERVAL_SECS", "5").parse().unwrap_or(5),
            ),
            jitter: Duration::from_millis(
                optional("AI_POLL_JITTER_MS", "1000").parse().unwrap_or(1000),
            ),
        };

        let ai = AiConfig {
            username: required("AI_ANALYSIS_USERNAME")?,
            apikey: required("AI_ANALYSIS_APIKEY")?,
            send_message_url: required("AI_ANALYSIS_SEND_MESSAGE_URL")?,
            status_url: required("AI_ANALYSIS_STATUS_URL")?,
            application: optional("AI_ANALYSIS_APPLICATION", "cloudlens"),
            max_tokens: optional("AI_ANALYSIS_MAX_TOKENS", "4096").parse().unwrap_or(4096),
            model_type: optional("AI_ANALYSIS_MODEL_TYPE", "gpt-4"),
            temperature: optional("AI_ANALYSIS_TEMPERATURE", "0.2").parse().unwrap_or(0.2),
            poll,
        };

        let sandbox = SandboxConfig {
            compiler: optional("SANDBOX_COMPILER", "javac"),
            runtime: optional("SANDBOX_RUNTIME", "java"),
            classpath: optional("SANDBOX_CLASSPATH", &optional("CLASSPATH", ".")),
            main_class: optional("SANDBOX_MAIN_CLASS", "StabilityAnalysisVisualization"),
            timeout: Duration::from_secs(
                optional("SANDBOX_TIMEOUT_SECS", "300").parse().unwrap_or(300),
            ),
        };

        Ok(Config {
            aws,
            ai,
            roles: Self::roles_from_env(),
            sandbox,
            chart_timezone: optional("CHART_TIMEZONE", "UTC"),
        })
    }

    ///Pairs come as "group:topic,group:topic"; placeholders when nothing is configured
    fn roles_from_env() -> Vec<LogicalRole> {
        let raw = optional(
            "CONSUMER_GROUP_TOPIC_PAIRS",
            "worker-consumer-group:worker-topic,\
             notify-consumer-group:notify-topic,\
             async-notify-consumer-group:async-notify-topic",
        );
        raw.split(',')
            .filter_map(|pair| {
                let pair = pair.trim();
                let (cg, topic) = pair.split_once(':')?;
                Some(LogicalRole::from_pair(cg.trim(), topic.trim()))
            })
            .collect()
    }
}
