use std::error::Error;
use std::fmt;
use std::io::{stdout, Write};
use chrono::Utc;
use tokio::sync::oneshot;

///Error taxonomy of the report pipeline. Item-level fetch failures are absorbed
///inside aggregation and never reach this type; everything that crosses a module
///boundary is classified here.
#[derive(Debug)]
pub enum ReportError {
    ///A file, task or discovered entity is absent (distinct from a transient failure)
    NotFound(String),
    ///Non-success response or malformed payload from a remote endpoint
    RemoteCall(String),
    ///The poll ceiling or a subprocess deadline was exceeded
    Timeout(String),
    ///An entire report view produced no data
    Assembly(String),
    ///The caller abandoned an in-flight analysis
    Cancelled(String),
    Io(std::io::Error),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReportError::NotFound(msg) => write!(f, "{}", msg),
            ReportError::RemoteCall(msg) => write!(f, "{}", msg),
            ReportError::Timeout(msg) => write!(f, "{}", msg),
            ReportError::Assembly(msg) => write!(f, "{}", msg),
            ReportError::Cancelled(msg) => write!(f, "{}", msg),
            ReportError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl Error for ReportError {}

impl From<std::io::Error> for ReportError {
    fn from(e: std::io::Error) -> Self {
        ReportError::Io(e)
    }
}

impl From<reqwest::Error> for ReportError {
    fn from(e: reqwest::Error) -> Self {
        ReportError::RemoteCall(e.to_string())
    }
}

impl From<serde_json::Error> for ReportError {
    fn from(e: serde_json::Error) -> Self {
        ReportError::RemoteCall(format!("malformed payload: {}", e))
    }
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn get_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

///Timestamp usable as a directory suffix - ':' and '.' would upset some filesystems
pub fn timestamp_slug() -> String {
    let re = regex::Regex::new(r"[:.]+").unwrap();
    re.replace_all(&Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true), "-")
        .to_string()
}

pub fn get_safe_filename(name: &str) -> String {
    name.replace('/', "_")
        .replace(' ', "_")
        .replace(':', "")
        .replace('*', "_")
        .to_lowercase()
}

pub async fn spinning_gears(mut done: oneshot::Receiver<()>) {
    let frames = ["⚙ ", " ⚙", "⚙ ", " ⚙"];
    let mut i = 0;
    //a dropped sender ends the wait the same way a sent signal does
    while matches!(done.try_recv(), Err(oneshot::error::TryRecvError::Empty)) {
        print!("\r{}", frames[i % frames.len()]);
        let _ = stdout().flush();
        i += 1;
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    }
    println!("\r✅ Got response!");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round2_truncates_to_cents() {
        assert_eq!(round2(3.14159), 3.14);
        assert_eq!(round2(2.71828), 2.72);
        assert_eq!(round2(100.0), 100.0);
    }

    #[test]
    fn safe_filename_strips_separators() {
        assert_eq!(get_safe_filename("Async Notify"), "async_notify");
        assert_eq!(get_safe_filename("a/b:c*d"), "a_bc_d");
    }
}
