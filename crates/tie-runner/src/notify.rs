use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::{anyhow, Result};
use tracing::info;

pub const DEFAULT_SMTP_URL: &str = "smtps://smtp.gmail.com:465";

/// Delivers status mail about stage calls. Callers log and ignore failures.
pub trait Notifier {
    fn send(&mut self, from: &str, to: &str, subject: &str, body: &str, credential: &str)
        -> Result<()>;
}

#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(
        &mut self,
        _from: &str,
        to: &str,
        subject: &str,
        _body: &str,
        _credential: &str,
    ) -> Result<()> {
        info!(to, subject, "notification");
        Ok(())
    }
}

/// Sends mail over SMTP by piping the message into `curl`.
#[derive(Debug, Clone)]
pub struct CurlSmtpNotifier {
    smtp_url: String,
}

impl CurlSmtpNotifier {
    pub fn new(smtp_url: Option<&str>) -> Self {
        Self {
            smtp_url: smtp_url.unwrap_or(DEFAULT_SMTP_URL).to_string(),
        }
    }
}

fn format_message(from: &str, to: &str, subject: &str, body: &str) -> String {
    format!(
        "From: {}\r\nTo: {}\r\nSubject: {}\r\n\r\n{}\r\n",
        from,
        to,
        subject,
        body.replace('\n', "\r\n")
    )
}

impl Notifier for CurlSmtpNotifier {
    fn send(
        &mut self,
        from: &str,
        to: &str,
        subject: &str,
        body: &str,
        credential: &str,
    ) -> Result<()> {
        let mut child = Command::new("curl")
            .args(["--silent", "--show-error", "--ssl-reqd", "--url"])
            .arg(&self.smtp_url)
            .args(["--mail-from", from, "--mail-rcpt", to, "--user"])
            .arg(format!("{}:{}", from, credential))
            .args(["--upload-file", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(format_message(from, to, subject, body).as_bytes())?;
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(anyhow!(
                "curl exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }
}
