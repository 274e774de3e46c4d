// Copyright (c) The leetcode-weekly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rendering of the weekly leaderboard.

use crate::aggregate::{AggregationResult, Outcome, Standing};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Discord rejects embed field values longer than this.
const FIELD_VALUE_LIMIT: usize = 1024;
/// Most fields an embed may carry.
const MAX_FIELDS: usize = 25;
/// Most characters an embed may carry across title, description, field
/// names and values, and footer.
const EMBED_LIMIT: usize = 6000;

const GREEN: u32 = 0x00ff00;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReportField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// A titled block of text, laid out like a chat embed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<ReportField>,
    pub footer: String,
    pub timestamp: DateTime<Utc>,
}

impl Report {
    /// Characters counted against Discord's embed limit.
    pub fn embed_len(&self) -> usize {
        self.title.chars().count()
            + self.description.chars().count()
            + fields_len(&self.fields)
            + self.footer.chars().count()
    }

    /// The Discord embed object for this report.
    pub fn to_embed(&self) -> serde_json::Value {
        serde_json::json!({
            "title": self.title,
            "description": self.description,
            "color": self.color,
            "fields": self.fields,
            "footer": { "text": self.footer },
            "timestamp": self.timestamp.to_rfc3339(),
        })
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f, "{}", self.description)?;
        for field in &self.fields {
            writeln!(f)?;
            writeln!(f, "{}", field.name)?;
            writeln!(f, "{}", field.value)?;
        }
        Ok(())
    }
}

/// Build the weekly leaderboard post.
///
/// Rankings that don't fit in one embed are cut short with a line saying
/// how many members were left out. The summary always covers everyone.
pub fn weekly_report(result: &AggregationResult, generated_at: DateTime<Utc>) -> Report {
    let mut report = Report {
        title: "📊 LeetCode Weekly Update".to_string(),
        description: format!("**Week of {}**", result.window),
        color: GREEN,
        fields: Vec::new(),
        footer: "LeetCode Weekly".to_string(),
        timestamp: generated_at,
    };

    if result.standings.is_empty() {
        report
            .fields
            .push(field("📭 No Activity", "No problems were solved this week."));
        return report;
    }

    let summary = field(
        "📈 Summary",
        &format!(
            "**Total Problems Solved:** {}\n**Active Users:** {}",
            result.total,
            result.active_users()
        ),
    );
    let fixed = report.embed_len() + fields_len(std::slice::from_ref(&summary));
    let budget = EMBED_LIMIT.saturating_sub(fixed);

    let lines: Vec<_> = result
        .standings
        .iter()
        .enumerate()
        .map(|(i, standing)| ranking_line(i + 1, standing))
        .collect();
    report.fields = ranking_fields(&lines, budget, MAX_FIELDS - 1);
    report.fields.push(summary);
    report
}

/// Ranking fields holding as many leading `lines` as fit in `budget`
/// characters and `max_fields` fields.
fn ranking_fields(lines: &[String], budget: usize, max_fields: usize) -> Vec<ReportField> {
    // No more lines than their own length allows, before field names.
    let mut used = 0;
    let mut shown = lines
        .iter()
        .take_while(|line| {
            used += line.chars().count() + 1;
            used <= budget
        })
        .count();

    loop {
        let mut kept = lines[..shown].to_vec();
        if shown < lines.len() {
            kept.push(format!("...and {} more", lines.len() - shown));
        }

        let fields: Vec<_> = pack_lines(&kept, FIELD_VALUE_LIMIT)
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let name = if i == 0 {
                    "🏆 Weekly Rankings"
                } else {
                    "🏆 Weekly Rankings (cont.)"
                };
                field(name, &chunk)
            })
            .collect();

        if shown == 0 || (fields.len() <= max_fields && fields_len(&fields) <= budget) {
            return fields;
        }
        shown -= 1;
    }
}

fn fields_len(fields: &[ReportField]) -> usize {
    fields
        .iter()
        .map(|f| f.name.chars().count() + f.value.chars().count())
        .sum()
}

fn field(name: &str, value: &str) -> ReportField {
    ReportField {
        name: name.to_string(),
        value: value.to_string(),
        inline: false,
    }
}

fn medal(rank: usize) -> &'static str {
    match rank {
        1 => "🥇",
        2 => "🥈",
        3 => "🥉",
        _ => "📊",
    }
}

fn ranking_line(rank: usize, standing: &Standing) -> String {
    let noun = if standing.solved == 1 {
        "problem"
    } else {
        "problems"
    };
    let mut line = format!(
        "{} **{}** ({}): {} {}",
        medal(rank),
        escape_markdown(&standing.display_name),
        escape_markdown(&standing.handle),
        standing.solved,
        noun
    );
    if let Outcome::Reconciled { .. } = standing.outcome {
        line.push_str(" (est.)");
    }
    line
}

/// Escape characters that Discord would read as formatting.
fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '_' | '~' | '`' | '|' | '>' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Join lines with newlines into chunks of at most `limit` characters. A
/// single line longer than `limit` gets a chunk to itself, cut to fit.
fn pack_lines(lines: &[String], limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in lines {
        let line: String = line.chars().take(limit).collect();
        let needed = if current.is_empty() {
            line.chars().count()
        } else {
            current.chars().count() + 1 + line.chars().count()
        };

        if needed > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&line);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{aggregate::FailureKind, window::ReportingWindow};
    use chrono::{NaiveDate, TimeZone};

    fn standing(name: &str, handle: &str, solved: u32, outcome: Outcome) -> Standing {
        Standing {
            user_id: 1,
            display_name: name.to_string(),
            handle: handle.to_string(),
            solved,
            problems: Vec::new(),
            outcome,
        }
    }

    fn result(standings: Vec<Standing>) -> AggregationResult {
        let total = standings.iter().map(|s| s.solved).sum();
        AggregationResult {
            window: ReportingWindow {
                start: NaiveDate::from_ymd_opt(2025, 8, 25).unwrap(),
                end: NaiveDate::from_ymd_opt(2025, 8, 31).unwrap(),
            },
            standings,
            total,
        }
    }

    fn generated() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 13, 0, 0).unwrap()
    }

    #[test]
    fn test_weekly_report_ranking() {
        let report = weekly_report(
            &result(vec![
                standing("Carol", "carol", 12, Outcome::Reconciled { raw: 3 }),
                standing("Alice", "alice_lc", 1, Outcome::Counted),
                standing("Bob", "bob", 0, Outcome::Failed(FailureKind::NotFound)),
                standing("Dan", "dan", 0, Outcome::Counted),
            ]),
            generated(),
        );

        assert_eq!(report.description, "**Week of 2025-08-25 to 2025-08-31**");
        assert_eq!(report.fields.len(), 2);

        let ranking = &report.fields[0].value;
        let lines: Vec<_> = ranking.lines().collect();
        assert_eq!(lines[0], "🥇 **Carol** (carol): 12 problems (est.)");
        assert_eq!(lines[1], "🥈 **Alice** (alice\\_lc): 1 problem");
        assert_eq!(lines[2], "🥉 **Bob** (bob): 0 problems");
        assert_eq!(lines[3], "📊 **Dan** (dan): 0 problems");

        assert_eq!(
            report.fields[1].value,
            "**Total Problems Solved:** 13\n**Active Users:** 4"
        );
    }

    #[test]
    fn test_empty_week_says_no_activity() {
        let report = weekly_report(&result(Vec::new()), generated());
        assert_eq!(report.fields.len(), 1);
        assert!(report.fields[0].name.contains("No Activity"));
        assert!(report.to_string().contains("No problems were solved this week."));
    }

    #[test]
    fn test_embed_shape() {
        let report = weekly_report(
            &result(vec![standing("Alice", "alice", 2, Outcome::Counted)]),
            generated(),
        );
        let embed = report.to_embed();
        assert_eq!(embed["title"], "📊 LeetCode Weekly Update");
        assert_eq!(embed["color"], 0x00ff00);
        assert_eq!(embed["fields"].as_array().unwrap().len(), 2);
        assert_eq!(embed["fields"][0]["inline"], false);
        assert_eq!(embed["timestamp"], "2025-09-01T13:00:00+00:00");
    }

    #[test]
    fn test_long_rankings_are_split() {
        let standings: Vec<_> = (0..60)
            .map(|i| standing(&format!("Member {i}"), &format!("member{i}"), 5, Outcome::Counted))
            .collect();
        let report = weekly_report(&result(standings), generated());

        let ranking_fields: Vec<_> = report
            .fields
            .iter()
            .filter(|f| f.name.contains("Weekly Rankings"))
            .collect();
        assert!(ranking_fields.len() > 1);
        assert!(ranking_fields[1].name.ends_with("(cont.)"));
        for f in &ranking_fields {
            assert!(f.value.chars().count() <= FIELD_VALUE_LIMIT);
        }
        let total_lines: usize = ranking_fields.iter().map(|f| f.value.lines().count()).sum();
        assert_eq!(total_lines, 60);
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("a_b*c"), "a\\_b\\*c");
        assert_eq!(escape_markdown("plain"), "plain");
    }

    #[test]
    fn test_huge_rankings_fit_one_embed() {
        let standings: Vec<_> = (0..400)
            .map(|i| {
                standing(
                    &format!("Member With A Rather Long Display Name {i}"),
                    &format!("member_handle_{i}"),
                    400 - i,
                    Outcome::Counted,
                )
            })
            .collect();
        let report = weekly_report(&result(standings), generated());

        assert!(report.embed_len() <= EMBED_LIMIT, "{}", report.embed_len());
        assert!(report.fields.len() <= MAX_FIELDS);
        for f in &report.fields {
            assert!(f.value.chars().count() <= FIELD_VALUE_LIMIT);
        }

        let rankings: Vec<_> = report
            .fields
            .iter()
            .filter(|f| f.name.contains("Weekly Rankings"))
            .collect();
        let shown = rankings
            .iter()
            .flat_map(|f| f.value.lines())
            .filter(|line| line.contains("**Member"))
            .count();
        let last = rankings.last().unwrap().value.lines().last().unwrap();
        assert_eq!(last, format!("...and {} more", 400 - shown));
        assert!(rankings[0].value.starts_with("🥇 **Member With A Rather Long Display Name 0**"));

        let summary = report.fields.last().unwrap();
        assert!(summary.name.contains("Summary"));
        assert!(summary.value.contains("**Active Users:** 400"));
    }

    #[test]
    fn test_ranking_fields_respect_field_count() {
        let lines: Vec<_> = (0..10).map(|i| format!("{i}").repeat(1000)).collect();
        let fields = ranking_fields(&lines, 100_000, 3);
        assert_eq!(fields.len(), 3);
        // The note shares the last field with the third line.
        assert_eq!(fields[2].value.lines().last().unwrap(), "...and 7 more");
    }
}
