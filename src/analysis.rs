use std::collections::HashMap;
use std::time::Duration;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use crate::config::AiConfig;
use crate::debug_note;
use crate::tools::ReportError;

pub static PLACEHOLDER_RESULT: &str = "Analysis completed but no result content found.";

static VECTOR_DATA_PREAMBLE: &str = "Here is CloudWatch metrics vector data in structured JSON format. \
This contains raw numerical data with timestamps, averages, minimums, and maximums for various metrics:\n\n";

static VECTOR_DATA_DIRECTIVE: &str = "Please provide detailed numerical analysis based on the vector data. \
Include specific values, timestamps, statistical calculations, and data-driven insights. \
Use the exact timestamps and values from the data points.";

static VECTOR_DATA_ROLE: &str = "act as a CloudWatch metrics and data analysis expert \
who can perform detailed numerical analysis on time-series data";

pub static STABILITY_PROMPT: &str = r#"Analyze this CloudWatch metrics vector data for stability assessment. The data contains raw numerical metrics with timestamps, averages, minimums, and maximums:

1. **DB CPU Utilization Analysis:**
   - Expected range: 40% - 50%
   - Identify any data points where average, minimum, or maximum values fall outside this range
   - Report specific timestamps and values for any spikes above 50% or drops below 40%
   - Analyze trends and patterns over the time period
   - Calculate percentage of time spent outside expected range

2. **DB Connections Analysis:**
   - Expected range: 2,000 - 2,500 connections
   - Examine connection metrics for values outside this range
   - Report specific timestamps and values for any spikes above 2,500 or drops below 2,000
   - Look for sudden changes or irregular patterns
   - Identify peak connection times

3. **Memory Usage Analysis:**
   - Examine freeable_memory trends
   - Identify any memory pressure indicators
   - Look for patterns that might indicate memory leaks or high usage

4. **Overall Stability Assessment:**
   - Identify correlations between CPU, connections, and memory patterns
   - Note any periods of instability or concerning trends
   - Calculate stability scores based on time within expected ranges
   - Provide specific recommendations based on the numerical data

5. **Java Visualization Program - REQUIRED:**
   - MUST generate a complete Java program using JFreeChart that can plot all the metrics from the JSON data
   - Include complete main() method and all necessary methods
   - Parse the embedded JSON data and create time-series charts for CPU, connections, memory, and Kafka lag
   - Add red markers for values outside expected ranges (CPU >50% or <40%, connections outside 2000-2500)
   - Create separate PNG files for each metric type (cpu_analysis.png, connections_analysis.png, memory_analysis.png, kafka_lag_analysis.png)
   - Include proper chart titles, axis labels, legends, and annotations for anomalies
   - Use JFreeChart TimeSeriesCollection and save charts using ChartUtils.saveChartAsPNG()
   - Make the program executable against a metrics_data.json file in its working directory
   - Include exception handling and console output for generated files

Please provide detailed analysis with specific values, timestamps, and statistical insights from the raw data, followed by the complete Java visualization program enclosed in ```java code blocks."#;

pub static PERFORMANCE_PROMPT: &str = r#"Analyze this CloudWatch metrics vector data and provide insights on:
1. Performance bottlenecks identified from the metrics
2. Resource utilization patterns and recommendations
3. Kafka consumer lag analysis and potential issues
4. Database performance insights from RDS metrics
5. Overall system health assessment
6. Actionable recommendations for optimization

Please provide a structured analysis with clear sections for each area."#;

pub static ANOMALY_PROMPT: &str = r#"Analyze this CloudWatch metrics vector data and identify:
1. Any unusual spikes or drops in metrics
2. Patterns that deviate from normal behavior
3. Potential system anomalies or issues
4. Correlation between different metrics that might indicate problems
5. Time periods with suspicious activity
6. Recommendations for investigation or immediate action

Focus on identifying actionable anomalies that require attention."#;

pub static CAPACITY_PROMPT: &str = r#"Analyze this CloudWatch metrics vector data for capacity planning:
1. Current resource utilization trends
2. Growth patterns in metrics over time
3. Projected resource needs based on current trends
4. Recommendations for scaling (up/down/out)
5. Cost optimization opportunities
6. Timeline for capacity adjustments

Provide specific recommendations with estimated timelines and priorities."#;

///Selects the instruction for one analysis run. Unknown types fall back to the
///performance analysis; "custom" demands a non-empty prompt of its own.
pub fn prompt_for(analysis_type: &str, custom_prompt: &str) -> Result<String, ReportError> {
    match analysis_type.to_lowercase().as_str() {
        "custom" => {
            let trimmed = custom_prompt.trim();
            if trimmed.is_empty() {
                return Err(ReportError::NotFound(
                    "custom analysis requires a non-empty custom prompt".to_string(),
                ));
            }
            Ok(trimmed.to_string())
        }
        "stability" => Ok(STABILITY_PROMPT.to_string()),
        "anomalies" => Ok(ANOMALY_PROMPT.to_string()),
        "capacity" => Ok(CAPACITY_PROMPT.to_string()),
        _ => Ok(PERFORMANCE_PROMPT.to_string()),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisMessage {
    pub user: String,
}

///Submit body of the analysis endpoint. Most prompt* fields are always empty;
///the endpoint rejects bodies without them, so they stay in the contract.
#[derive(Debug, Serialize)]
pub struct AnalysisPayload {
    pub username: String,
    pub apikey: String,
    pub conv_id: String,
    pub application: String,
    pub messages: Vec<AnalysisMessage>,
    pub promptfilename: String,
    pub promptname: String,
    pub prompttype: String,
    pub promptrole: String,
    pub prompttask: String,
    pub promptexamples: String,
    pub promptformat: String,
    pub promptrestrictions: String,
    pub promptadditional: String,
    pub max_tokens: u32,
    pub model_type: String,
    pub temperature: f64,
    #[serde(rename = "topKChunks")]
    pub top_k_chunks: u32,
    pub read_from_your_data: bool,
    pub data_filenames: Vec<String>,
    pub document_groupname: String,
    pub document_grouptags: Vec<String>,
    pub find_the_best_response: bool,
    pub chat_attr: HashMap<String, serde_json::Value>,
    pub additional_attr: HashMap<String, serde_json::Value>,
}

impl AnalysisPayload {
    ///Three ordered user messages: the dataset itself, the analysis
    ///instruction, and the output-format directive
    pub fn vector_data(ai: &AiConfig, dataset_json: &str, prompt: &str) -> AnalysisPayload {
        let messages = vec![
            AnalysisMessage {
                user: format!("{}{}", VECTOR_DATA_PREAMBLE, dataset_json),
            },
            AnalysisMessage {
                user: prompt.to_string(),
            },
            AnalysisMessage {
                user: VECTOR_DATA_DIRECTIVE.to_string(),
            },
        ];
        AnalysisPayload {
            username: ai.username.clone(),
            apikey: ai.apikey.clone(),
            conv_id: String::new(),
            application: ai.application.clone(),
            messages,
            promptfilename: String::new(),
            promptname: String::new(),
            prompttype: "system".to_string(),
            promptrole: VECTOR_DATA_ROLE.to_string(),
            prompttask: String::new(),
            promptexamples: String::new(),
            promptformat: String::new(),
            promptrestrictions: String::new(),
            promptadditional: String::new(),
            max_tokens: ai.max_tokens,
            model_type: ai.model_type.clone(),
            temperature: ai.temperature,
            top_k_chunks: 2,
            read_from_your_data: false,
            data_filenames: Vec::new(),
            document_groupname: String::new(),
            document_grouptags: Vec::new(),
            find_the_best_response: false,
            chat_attr: HashMap::new(),
            additional_attr: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Submitted,
    Running,
    Complete,
    Failed,
    ///Unknown statuses keep the poll loop going instead of aborting it
    Other(String),
}

impl TaskStatus {
    pub fn parse(raw: &str) -> TaskStatus {
        match raw {
            "Submitted" => TaskStatus::Submitted,
            "Running" => TaskStatus::Running,
            "Complete" => TaskStatus::Complete,
            "Failed" => TaskStatus::Failed,
            other => TaskStatus::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub task_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
}

///Transport seam of the task protocol, so the submit/poll state machine is
///testable against a scripted endpoint
#[async_trait]
pub trait AnalysisApi: Send + Sync {
    async fn submit(&self, payload: &AnalysisPayload) -> Result<SubmitResponse, ReportError>;
    async fn status(&self, task_id: &str) -> Result<StatusResponse, ReportError>;
}

pub struct HttpAnalysisApi {
    client: reqwest::Client,
    send_message_url: String,
    status_url: String,
}

impl HttpAnalysisApi {
    pub fn new(ai: &AiConfig) -> HttpAnalysisApi {
        HttpAnalysisApi {
            client: reqwest::Client::new(),
            send_message_url: ai.send_message_url.clone(),
            status_url: ai.status_url.clone(),
        }
    }
}

#[async_trait]
impl AnalysisApi for HttpAnalysisApi {
    async fn submit(&self, payload: &AnalysisPayload) -> Result<SubmitResponse, ReportError> {
        let response = self
            .client
            .post(&self.send_message_url)
            .header("accept", "application/json")
            .json(payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ReportError::RemoteCall(format!(
                "analysis submit failed with status: {}",
                response.status()
            )));
        }
        Ok(response.json::<SubmitResponse>().await?)
    }

    async fn status(&self, task_id: &str) -> Result<StatusResponse, ReportError> {
        let response = self
            .client
            .get(format!("{}{}", self.status_url, task_id))
            .header("accept", "application/json")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ReportError::RemoteCall(format!(
                "status call failed with status: {}",
                response.status()
            )));
        }
        Ok(response.json::<StatusResponse>().await?)
    }
}

///How long and how patiently we wait for a task. Jitter spreads retries of
///concurrent reports so the status endpoint is not hit in lockstep.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub jitter: Duration,
}

impl Default for PollPolicy {
    fn default() -> PollPolicy {
        PollPolicy {
            max_attempts: 60,
            interval: Duration::from_secs(5),
            jitter: Duration::from_secs(1),
        }
    }
}

pub async fn submit(
    api: &dyn AnalysisApi,
    payload: &AnalysisPayload,
) -> Result<String, ReportError> {
    let response = api.submit(payload).await?;
    match response.task_id {
        Some(task_id) if !task_id.is_empty() => {
            debug_note!("analysis task accepted: {}", task_id);
            Ok(task_id)
        }
        _ => Err(ReportError::RemoteCall(
            "submit response carried no task_id".to_string(),
        )),
    }
}

///Waits for the task to finish. At most `max_attempts` status requests, one
///per interval (plus jitter); the cancel signal aborts the wait between
///requests, never mid-request.
pub async fn poll(
    api: &dyn AnalysisApi,
    task_id: &str,
    policy: &PollPolicy,
    mut cancel: oneshot::Receiver<()>,
) -> Result<String, ReportError> {
    //once the sender is gone the receiver must not be polled again
    let mut armed = true;
    for attempt in 1..=policy.max_attempts {
        let response = api.status(task_id).await?;
        let raw_status = response.status.ok_or_else(|| {
            ReportError::RemoteCall(format!(
                "status response for task {} carried no status field",
                task_id
            ))
        })?;
        match TaskStatus::parse(&raw_status) {
            TaskStatus::Complete => {
                return Ok(response
                    .result
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| PLACEHOLDER_RESULT.to_string()));
            }
            TaskStatus::Failed => {
                return Err(ReportError::RemoteCall(format!(
                    "analysis failed for task: {}",
                    task_id
                )));
            }
            _ => {
                debug_note!("task {} attempt {}: {}", task_id, attempt, raw_status);
            }
        }

        if attempt < policy.max_attempts {
            let jitter_ms = if policy.jitter.is_zero() {
                0
            } else {
                rand::thread_rng().gen_range(0..=policy.jitter.as_millis() as u64)
            };
            let nap = policy.interval + Duration::from_millis(jitter_ms);
            tokio::select! {
                _ = tokio::time::sleep(nap) => {}
                res = &mut cancel, if armed => {
                    if res.is_ok() {
                        return Err(ReportError::Cancelled(format!(
                            "wait for task {} was cancelled",
                            task_id
                        )));
                    }
                    armed = false;
                    tokio::time::sleep(nap).await;
                }
            }
        }
    }
    Err(ReportError::Timeout(format!(
        "task {} did not complete within {} status checks",
        task_id, policy.max_attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FakeApi {
        task_id: Option<String>,
        statuses: Mutex<VecDeque<StatusResponse>>,
        status_calls: Mutex<u32>,
    }

    impl FakeApi {
        fn new(task_id: Option<&str>, statuses: Vec<StatusResponse>) -> FakeApi {
            FakeApi {
                task_id: task_id.map(|s| s.to_string()),
                statuses: Mutex::new(statuses.into()),
                status_calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.status_calls.lock().unwrap()
        }
    }

    fn status(s: &str, result: Option<&str>) -> StatusResponse {
        StatusResponse {
            status: Some(s.to_string()),
            result: result.map(|r| r.to_string()),
        }
    }

    #[async_trait]
    impl AnalysisApi for FakeApi {
        async fn submit(&self, _payload: &AnalysisPayload) -> Result<SubmitResponse, ReportError> {
            Ok(SubmitResponse {
                task_id: self.task_id.clone(),
            })
        }

        async fn status(&self, _task_id: &str) -> Result<StatusResponse, ReportError> {
            *self.status_calls.lock().unwrap() += 1;
            Ok(self
                .statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| status("Running", None)))
        }
    }

    fn fast_policy() -> PollPolicy {
        PollPolicy {
            max_attempts: 60,
            interval: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    fn ai_config() -> AiConfig {
        AiConfig {
            username: "svc".to_string(),
            apikey: "key".to_string(),
            send_message_url: "http://localhost/send".to_string(),
            status_url: "http://localhost/status/".to_string(),
            application: "cloudlens".to_string(),
            max_tokens: 4096,
            model_type: "gpt-4".to_string(),
            temperature: 0.2,
            poll: PollPolicy::default(),
        }
    }

    #[tokio::test]
    async fn completes_on_the_last_allowed_attempt() {
        let mut script: Vec<StatusResponse> =
            (0..59).map(|_| status("Running", None)).collect();
        script.push(status("Complete", Some("the analysis")));
        let api = FakeApi::new(None, script);
        let (_tx, rx) = oneshot::channel();
        let result = poll(&api, "t-1", &fast_policy(), rx).await.unwrap();
        assert_eq!(result, "the analysis");
        assert_eq!(api.calls(), 60);
    }

    #[tokio::test]
    async fn exhaustion_is_a_timeout_after_exactly_max_attempts() {
        let api = FakeApi::new(None, Vec::new());
        let (_tx, rx) = oneshot::channel();
        let err = poll(&api, "t-2", &fast_policy(), rx).await.unwrap_err();
        assert!(matches!(err, ReportError::Timeout(_)));
        assert_eq!(api.calls(), 60);
    }

    #[tokio::test]
    async fn failed_status_aborts_immediately() {
        let api = FakeApi::new(None, vec![status("Running", None), status("Failed", None)]);
        let (_tx, rx) = oneshot::channel();
        let err = poll(&api, "t-3", &fast_policy(), rx).await.unwrap_err();
        assert!(err.to_string().contains("analysis failed for task: t-3"));
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn complete_without_result_yields_placeholder() {
        let api = FakeApi::new(None, vec![status("Complete", None)]);
        let (_tx, rx) = oneshot::channel();
        let result = poll(&api, "t-4", &fast_policy(), rx).await.unwrap();
        assert_eq!(result, PLACEHOLDER_RESULT);
    }

    #[tokio::test]
    async fn unknown_status_keeps_polling() {
        let api = FakeApi::new(
            None,
            vec![status("Queued", None), status("Complete", Some("done"))],
        );
        let (_tx, rx) = oneshot::channel();
        let result = poll(&api, "t-5", &fast_policy(), rx).await.unwrap();
        assert_eq!(result, "done");
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn missing_status_field_is_a_remote_error() {
        let api = FakeApi::new(
            None,
            vec![StatusResponse {
                status: None,
                result: None,
            }],
        );
        let (_tx, rx) = oneshot::channel();
        let err = poll(&api, "t-6", &fast_policy(), rx).await.unwrap_err();
        assert!(matches!(err, ReportError::RemoteCall(_)));
    }

    #[tokio::test]
    async fn cancellation_wins_over_the_sleep() {
        let api = FakeApi::new(None, Vec::new());
        let policy = PollPolicy {
            max_attempts: 60,
            interval: Duration::from_secs(5),
            jitter: Duration::ZERO,
        };
        let (tx, rx) = oneshot::channel();
        tx.send(()).unwrap();
        let err = poll(&api, "t-7", &policy, rx).await.unwrap_err();
        assert!(matches!(err, ReportError::Cancelled(_)));
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn submit_rejects_missing_or_empty_task_id() {
        let payload = AnalysisPayload::vector_data(&ai_config(), "{}", "prompt");
        let api = FakeApi::new(None, Vec::new());
        assert!(submit(&api, &payload).await.is_err());
        let api = FakeApi::new(Some(""), Vec::new());
        assert!(submit(&api, &payload).await.is_err());
        let api = FakeApi::new(Some("t-8"), Vec::new());
        assert_eq!(submit(&api, &payload).await.unwrap(), "t-8");
    }

    #[test]
    fn payload_layout_matches_the_endpoint_contract() {
        let payload = AnalysisPayload::vector_data(&ai_config(), "{\"x\":1}", "analyze this");
        let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&payload).unwrap()).unwrap();
        assert_eq!(json["messages"].as_array().unwrap().len(), 3);
        assert!(json["messages"][0]["user"]
            .as_str()
            .unwrap()
            .starts_with("Here is CloudWatch metrics vector data"));
        assert_eq!(json["messages"][1]["user"], "analyze this");
        assert_eq!(json["topKChunks"], 2);
        assert_eq!(json["read_from_your_data"], false);
        assert_eq!(json["prompttype"], "system");
        assert_eq!(json["conv_id"], "");
        assert!(json["data_filenames"].as_array().unwrap().is_empty());
    }

    #[test]
    fn prompt_catalog_covers_the_analysis_types() {
        assert!(prompt_for("stability", "").unwrap().contains("JFreeChart"));
        assert!(prompt_for("anomalies", "").unwrap().contains("anomalies"));
        assert!(prompt_for("capacity", "").unwrap().contains("capacity planning"));
        assert_eq!(prompt_for("performance", "").unwrap(), PERFORMANCE_PROMPT);
        // unknown types default to the performance analysis
        assert_eq!(prompt_for("whatever", "").unwrap(), PERFORMANCE_PROMPT);
        assert_eq!(prompt_for("custom", " my prompt ").unwrap(), "my prompt");
        assert!(prompt_for("custom", "  ").is_err());
    }
}
