use crate::summary::StatusSummary;
use crate::system::SystemInfo;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write;

/// the six prompt variables, in output order
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Report {
    pub load: String,
    pub myos: String,
    pub myversion: String,
    pub tty: String,
    pub users: String,
    pub vcs: String,
}

impl Report {
    pub fn new(system: &SystemInfo, vcs: Option<&StatusSummary>) -> Self {
        Self {
            load: system.load.to_string(),
            myos: system.os.clone(),
            myversion: system.version.clone(),
            tty: system.tty.clone(),
            users: system.users.to_string(),
            vcs: vcs.map(ToString::to_string).unwrap_or_default(),
        }
    }

    fn fields(&self) -> [(&'static str, &str); 6] {
        [
            ("load", self.load.as_str()),
            ("myos", self.myos.as_str()),
            ("myversion", self.myversion.as_str()),
            ("tty", self.tty.as_str()),
            ("users", self.users.as_str()),
            ("vcs", self.vcs.as_str()),
        ]
    }

    /// `name="value"` lines ready for `eval`
    pub fn to_shell(&self) -> String {
        let mut out = String::new();
        for (name, value) in self.fields() {
            let _ = writeln!(out, "{name}=\"{}\"", shell_escape(value));
        }
        out
    }

    pub fn to_json(&self) -> Result<String> {
        let mut out = serde_json::to_string(self).context("failed to serialise report")?;
        out.push('\n');
        Ok(out)
    }
}

/// escape the characters that stay special inside double quotes
fn shell_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
