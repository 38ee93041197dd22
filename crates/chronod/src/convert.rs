//! Converts a legacy five-field crontab file into a chronod job table.
//!
//! Named out of core scope by the purpose statement ("the one-shot tool
//! that converts legacy crontab text into the configuration format"), this
//! is the ambient CLI counterpart: it produces exactly the TOML shape
//! [`Schedule::persist`](crate::schedule::Schedule::persist) writes, so a
//! converted file is guaranteed to pass validation unchanged in meaning
//! from a hand-written one.

use std::collections::HashMap;
use std::path::Path;

use chronod_domain::Error;

use crate::schedule::{JobDefinition, Schedule};

/// Parse crontab text into job definitions. Blank lines and `#`-prefixed
/// comments are skipped. Each remaining line's first five
/// whitespace-separated fields are the time expression; everything after
/// that is the command verbatim.
pub fn parse_crontab(text: &str) -> Vec<JobDefinition> {
    let mut jobs = Vec::new();
    let mut label_counts: HashMap<String, u32> = HashMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.splitn(6, char::is_whitespace);
        let fields: Vec<&str> = (&mut parts).take(5).collect();
        if fields.len() != 5 {
            continue;
        }
        let command = match parts.next() {
            Some(rest) if !rest.trim().is_empty() => rest.trim().to_string(),
            _ => continue,
        };

        let schedule = fields.join(" ");
        let base_label = command
            .split_whitespace()
            .next()
            .map(|prog| {
                prog.rsplit('/')
                    .next()
                    .unwrap_or(prog)
                    .replace(' ', "-")
            })
            .unwrap_or_else(|| "job".to_string());

        let count = label_counts.entry(base_label.clone()).or_insert(0);
        let label = if *count == 0 {
            base_label.clone()
        } else {
            format!("{base_label}-{count}")
        };
        *count += 1;

        jobs.push(JobDefinition::new(label, command, schedule));
    }

    jobs
}

/// Read a crontab file, convert it, and write the resulting job table.
pub fn convert(input: &Path, output: &Path) -> Result<usize, Error> {
    let text = std::fs::read_to_string(input)?;
    let jobs = parse_crontab(&text);
    let count = jobs.len();
    let schedule = Schedule::new(jobs)?;
    schedule.persist(output)?;
    Ok(count)
}
