// src/bin/import_contacts.rs
// DOCUMENTATION: Bulk contact import through the autofill API
// Usage: import_contacts <contacts.json> [--dry-run]
use anyhow::{bail, Context, Result};
use dotenv::dotenv;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::process;
use std::time::{Duration, Instant};

// --- ANSI colours ---
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const CYAN: &str = "\x1b[36m";

// --- Data ---

/// One row of the input file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct ContactRecord {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    job_title: Option<String>,
    #[serde(default)]
    organisation: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
    /// Audit label, not part of the extracted fields
    #[serde(default, skip_serializing)]
    source: Option<String>,
}

impl ContactRecord {
    fn label(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .iter()
            .flatten()
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        match (name.is_empty(), &self.email, &self.organisation) {
            (false, _, Some(org)) => format!("{} ({})", name, org),
            (false, _, None) => name,
            (true, Some(email), _) => email.clone(),
            (true, None, Some(org)) => org.clone(),
            (true, None, None) => "<empty record>".to_string(),
        }
    }
}

#[derive(Serialize)]
struct AutofillPayload<'a> {
    fields: &'a ContactRecord,
    source_label: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct DecisionView {
    action: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AutofillResponse {
    organisation: DecisionView,
    person: DecisionView,
    #[serde(default)]
    linked: bool,
}

#[derive(Debug, Default)]
struct Summary {
    records: usize,
    failed: usize,
    people_created: usize,
    people_linked: usize,
    people_skipped: usize,
    organisations_created: usize,
    organisations_linked: usize,
    links_created: usize,
}

impl Summary {
    fn record(&mut self, response: &AutofillResponse) {
        match response.person.action.as_str() {
            "create" => self.people_created += 1,
            "link" => self.people_linked += 1,
            _ => self.people_skipped += 1,
        }
        match response.organisation.action.as_str() {
            "create" => self.organisations_created += 1,
            "link" => self.organisations_linked += 1,
            _ => {}
        }
        if response.linked {
            self.links_created += 1;
        }
    }
}

// --- Importer ---

struct ContactImporter {
    base_url: String,
    api_token: String,
    actor: String,
    dry_run: bool,
    client: Client,
    summary: Summary,
}

impl ContactImporter {
    fn new(base_url: String, api_token: String, actor: String, dry_run: bool) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url,
            api_token,
            actor,
            dry_run,
            client,
            summary: Summary::default(),
        })
    }

    async fn check_service_health(&self) -> bool {
        match self.client.get(format!("{}/health", self.base_url)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn submit(&self, record: &ContactRecord) -> Result<AutofillResponse> {
        let endpoint = if self.dry_run { "preview" } else { "apply" };
        let url = format!("{}/api/v1/autofill/{}", self.base_url, endpoint);
        let payload = AutofillPayload {
            fields: record,
            source_label: record.source.as_deref(),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .header("X-Actor", &self.actor)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("POST {}", url))?;

        if response.status().is_success() {
            response
                .json::<AutofillResponse>()
                .await
                .context("Failed to parse response JSON")
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            bail!("HTTP {} - {}", status, body)
        }
    }

    async fn run(&mut self, records: Vec<ContactRecord>) {
        println!("\n{}🔍 Checking service status...{}", CYAN, RESET);
        if !self.check_service_health().await {
            println!("{}❌ Service unavailable at {}.{}", RED, self.base_url, RESET);
            process::exit(1);
        }
        println!("{}✅ Service available{}\n", GREEN, RESET);

        self.print_header(records.len());
        let started = Instant::now();
        let total = records.len();

        for (i, record) in records.iter().enumerate() {
            self.summary.records += 1;
            match self.submit(record).await {
                Ok(response) => {
                    println!(
                        "{}[{}/{}]{} {:<40} person {}  organisation {}",
                        CYAN,
                        i + 1,
                        total,
                        RESET,
                        record.label(),
                        coloured(&response.person),
                        coloured(&response.organisation)
                    );
                    self.summary.record(&response);
                }
                Err(e) => {
                    println!(
                        "{}[{}/{}]{} {:<40} {}❌ {}{}",
                        CYAN,
                        i + 1,
                        total,
                        RESET,
                        record.label(),
                        RED,
                        e,
                        RESET
                    );
                    self.summary.failed += 1;
                }
            }
        }

        self.print_summary(started.elapsed().as_secs_f64());
    }

    fn print_header(&self, total: usize) {
        println!("{}╔══════════════════════════════════════════════════════════════╗{}", CYAN, RESET);
        println!("{}║   📇  Contact Import (autofill)                              ║{}", CYAN, RESET);
        println!("{}╚══════════════════════════════════════════════════════════════╝{}", CYAN, RESET);
        println!("\n{}📊 Records to import: {}{}", BOLD, total, RESET);
        if self.dry_run {
            println!("{}🧪 Dry run: decisions are previewed, nothing is written{}", YELLOW, RESET);
        }
        println!();
    }

    fn print_summary(&self, duration: f64) {
        let s = &self.summary;
        println!("\n{}📋 Import Summary{}", BOLD, RESET);
        println!("──────────────────────────────────────────────────────────────");
        println!("  • Records processed:     {}", s.records);
        println!("  • People created:        {}{}{}", GREEN, s.people_created, RESET);
        println!("  • People linked:         {}{}{}", BLUE, s.people_linked, RESET);
        println!("  • People skipped:        {}{}{}", YELLOW, s.people_skipped, RESET);
        println!("  • Organisations created: {}{}{}", GREEN, s.organisations_created, RESET);
        println!("  • Organisations linked:  {}{}{}", BLUE, s.organisations_linked, RESET);
        println!("  • Links created:         {}", s.links_created);
        println!("  • Failed requests:       {}{}{}", RED, s.failed, RESET);
        println!("  • Duration:              {:.1}s", duration);
        println!("──────────────────────────────────────────────────────────────");

        if s.failed == 0 {
            println!("\n{}✨ Import completed{}", GREEN, RESET);
        } else {
            println!("\n{}⚠️  Import completed with {} failure(s){}", YELLOW, s.failed, RESET);
        }
    }
}

fn coloured(decision: &DecisionView) -> String {
    let score = decision.score.map(|s| format!(" {:.2}", s)).unwrap_or_default();
    match decision.action.as_str() {
        "create" => format!("{}CREATE{}", GREEN, RESET),
        "link" => format!("{}LINK{}{}", BLUE, score, RESET),
        _ => format!(
            "{}SKIP{} ({}){}",
            YELLOW,
            score,
            decision.reason.as_deref().unwrap_or("no reason"),
            RESET
        ),
    }
}

fn parse_records(raw: &str) -> Result<Vec<ContactRecord>> {
    let records: Vec<ContactRecord> = serde_json::from_str(raw).context("Input must be a JSON array of contacts")?;
    Ok(records)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let dry_run = args.iter().any(|a| a == "--dry-run");
    let path = match args.iter().find(|a| !a.starts_with("--")) {
        Some(path) => path.clone(),
        None => {
            eprintln!("Usage: import_contacts <contacts.json> [--dry-run]");
            process::exit(2);
        }
    };

    let api_token = env::var("API_TOKEN").context("API_TOKEN must be set in .env")?;
    let base_url = env::var("CRM_API_URL").unwrap_or_else(|_| "http://localhost:8003".to_string());
    let actor = env::var("IMPORT_ACTOR").unwrap_or_else(|_| "import".to_string());

    let raw = std::fs::read_to_string(&path).with_context(|| format!("Cannot read {}", path))?;
    let records = parse_records(&raw)?;

    let mut importer = ContactImporter::new(base_url, api_token, actor, dry_run)?;
    importer.run(records).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_records_and_labels() {
        let raw = r#"[
            {"first_name": "Marie", "last_name": "Dupont", "organisation": "Acme Capital", "source": "cssf"},
            {"email": "info@example.lu"},
            {}
        ]"#;
        let records = parse_records(raw).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].label(), "Marie Dupont (Acme Capital)");
        assert_eq!(records[1].label(), "info@example.lu");
        assert_eq!(records[2].label(), "<empty record>");
    }

    #[test]
    fn test_source_is_not_sent_as_a_field() {
        let record = ContactRecord {
            email: Some("a@b.lu".into()),
            source: Some("cssf".into()),
            ..Default::default()
        };
        let payload = serde_json::to_value(AutofillPayload {
            fields: &record,
            source_label: record.source.as_deref(),
        })
        .unwrap();
        assert!(payload["fields"].get("source").is_none());
        assert_eq!(payload["source_label"], "cssf");
    }

    #[test]
    fn test_summary_counts_decisions() {
        let response: AutofillResponse = serde_json::from_str(
            r#"{"organisation": {"action": "link", "score": 1.0},
                "person": {"action": "skip", "reason": "possible duplicate", "score": 0.7},
                "linked": false}"#,
        )
        .unwrap();
        let mut summary = Summary::default();
        summary.record(&response);
        assert_eq!(summary.people_skipped, 1);
        assert_eq!(summary.organisations_linked, 1);
        assert_eq!(summary.links_created, 0);
    }

    #[test]
    fn test_rejects_non_array_input() {
        assert!(parse_records(r#"{"email": "a@b.lu"}"#).is_err());
    }
}
