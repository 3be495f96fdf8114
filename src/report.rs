use crate::work::{Member, Work};
use colored::Colorize;
use std::fmt::Write;

/// Terminal rendering of a list of works
pub struct WorksReport<'a> {
    pub heading: String,
    pub works: &'a [Work],
    /// Total matches reported by the service, when known
    pub total_results: Option<u64>,
}

impl<'a> WorksReport<'a> {
    pub fn new(heading: impl Into<String>, works: &'a [Work]) -> Self {
        Self {
            heading: heading.into(),
            works,
            total_results: None,
        }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total_results = Some(total);
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out);
        let _ = writeln!(out, "{}", self.heading.bold());
        let _ = writeln!(out, "{}", "=".repeat(50));

        match self.total_results {
            Some(total) => {
                let _ = writeln!(
                    out,
                    "Showing {} of {} works",
                    self.works.len().to_string().green(),
                    total
                );
            }
            None => {
                let _ = writeln!(out, "Total works: {}", self.works.len().to_string().green());
            }
        }
        let _ = writeln!(out);

        if self.works.is_empty() {
            let _ = writeln!(out, "{}", "No works found".yellow());
            return out;
        }

        for work in self.works {
            render_work(&mut out, work);
        }

        out
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self.works)
    }
}

fn render_work(out: &mut String, work: &Work) {
    let work_type = work.work_type.as_deref().unwrap_or("unknown").to_uppercase();

    let _ = writeln!(
        out,
        "{} {}",
        format!("[{}]", work_type).dimmed(),
        truncate(work.display_title(), 100).bold()
    );
    let _ = writeln!(out, "    {}", work.display_authors());

    let mut meta = Vec::new();
    if let Some(container) = work.container() {
        meta.push(container.italic().to_string());
    }
    meta.push(work.format_published());
    let _ = writeln!(out, "    {}", meta.join(" | "));

    if let Some(url) = &work.url {
        let _ = writeln!(out, "    {}", url.cyan());
    } else if !work.doi.is_empty() {
        let _ = writeln!(out, "    {}", format!("https://doi.org/{}", work.doi).cyan());
    }
    let _ = writeln!(out);
}

pub fn render_member(member: &Member) -> String {
    let mut out = String::new();

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", member.primary_name.bold());
    let _ = writeln!(out, "{}", "=".repeat(50));
    let _ = writeln!(out, "Member ID: {}", member.id);

    if let Some(location) = &member.location {
        let _ = writeln!(out, "Location:  {}", location);
    }
    if !member.prefixes.is_empty() {
        let _ = writeln!(out, "Prefixes:  {}", member.prefixes.join(", "));
    }
    if let Some(counts) = &member.counts {
        let _ = writeln!(
            out,
            "DOIs:      {} total ({} current, {} backfile)",
            counts.total_dois.to_string().green(),
            counts.current_dois,
            counts.backfile_dois
        );
    }

    out
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
