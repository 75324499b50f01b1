// src/services/extractor.rs
// DOCUMENTATION: Rule-based contact extraction
// PURPOSE: Fallback when no AI provider is configured or the provider fails

use crate::models::ExtractedContact;
use crate::services::dedup;

/// Words that mark a line as a job title
const TITLE_KEYWORDS: &[&str] = &[
    "director", "directeur", "directrice", "manager", "head", "chief", "ceo", "cfo", "coo", "cio",
    "cto", "partner", "associate", "officer", "analyst", "advisor", "adviser", "founder",
    "president", "vp", "gerant", "responsable", "charge", "conseiller", "consultant",
    "administrateur", "secretary", "treasurer", "member",
];

/// Words that mark a line as an organisation when no legal form is present
const ORGANISATION_KEYWORDS: &[&str] = &[
    "bank", "banque", "capital", "asset", "management", "fund", "funds", "fonds", "investment",
    "investments", "partners", "advisors", "securities", "insurance", "assurances", "trust",
    "holding", "gestion", "finance", "financial",
];

const TRIM_CHARS: &[char] = &['<', '>', '(', ')', '[', ']', ',', ';', ':', '"', '\'', '.'];

pub struct HeuristicExtractor;

impl HeuristicExtractor {
    /// Extract whatever can be recognised; never fails
    pub fn extract(text: &str) -> ExtractedContact {
        let mut contact = ExtractedContact::default();
        let mut free_lines: Vec<&str> = Vec::new();

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if let Some((label, value)) = Self::labelled(line) {
                Self::apply_label(&mut contact, &label, value);
                continue;
            }

            let mut consumed = false;
            if contact.email.is_none() {
                if let Some(email) = Self::find_email(line) {
                    contact.email = Some(email);
                    consumed = true;
                }
            }
            if contact.website.is_none() {
                if let Some(website) = Self::find_website(line) {
                    contact.website = Some(website);
                    consumed = true;
                }
            }
            if contact.phone.is_none() {
                if let Some(phone) = Self::find_phone(line) {
                    contact.phone = Some(phone);
                    consumed = true;
                }
            }

            if !consumed && !line.contains('@') {
                free_lines.push(line);
            }
        }

        for line in free_lines {
            if contact.organisation.is_none() && Self::looks_like_organisation(line) {
                contact.organisation = Some(line.to_string());
            } else if contact.job_title.is_none() && Self::looks_like_title(line) {
                contact.job_title = Some(line.to_string());
            } else if contact.first_name.is_none() && contact.last_name.is_none() {
                if let Some((first, last)) = Self::split_name(line) {
                    contact.first_name = Some(first);
                    contact.last_name = Some(last);
                }
            }
        }

        contact.cleaned()
    }

    /// "Label: value" lines (Name, Company, Title, Email, Phone, Website, Country)
    fn labelled(line: &str) -> Option<(String, &str)> {
        let (label, value) = line.split_once(':')?;
        let label = dedup::fold(label);
        let value = value.trim();
        if value.is_empty() || label.split(' ').count() > 2 || value.starts_with("//") {
            return None;
        }
        Some((label, value))
    }

    fn apply_label(contact: &mut ExtractedContact, label: &str, value: &str) {
        match label {
            "name" | "nom" | "contact" | "full name" => {
                if let Some((first, last)) = Self::split_name(value) {
                    contact.first_name = Some(first);
                    contact.last_name = Some(last);
                }
            }
            "first name" | "prenom" => contact.first_name = Some(value.to_string()),
            "last name" | "surname" | "nom de famille" => contact.last_name = Some(value.to_string()),
            "company" | "organisation" | "organization" | "societe" | "entreprise" | "firm" => {
                contact.organisation = Some(value.to_string())
            }
            "title" | "position" | "role" | "fonction" | "poste" | "job title" => {
                contact.job_title = Some(value.to_string())
            }
            "email" | "e mail" | "mail" | "courriel" => contact.email = Self::find_email(value),
            "phone" | "tel" | "telephone" | "mobile" | "gsm" => contact.phone = Self::find_phone(value),
            "web" | "website" | "site" | "url" => contact.website = Self::find_website(value),
            "country" | "pays" => {
                let code = value.trim();
                if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
                    contact.country_code = Some(code.to_string());
                }
            }
            _ => log::debug!("Ignoring unknown label '{}'", label),
        }
    }

    pub fn find_email(line: &str) -> Option<String> {
        line.split_whitespace()
            .map(|token| token.trim_matches(TRIM_CHARS))
            .map(|token| token.strip_prefix("mailto").unwrap_or(token).trim_matches(TRIM_CHARS))
            .find_map(dedup::normalize_email)
    }

    pub fn find_website(line: &str) -> Option<String> {
        line.split_whitespace()
            .map(|token| token.trim_matches(TRIM_CHARS))
            .find(|token| {
                let lower = token.to_lowercase();
                (lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("www."))
                    && !lower.contains('@')
            })
            .map(str::to_string)
    }

    /// First run of phone characters holding 8 to 15 digits
    pub fn find_phone(line: &str) -> Option<String> {
        let mut current = String::new();
        let mut runs = Vec::new();

        for c in line.chars() {
            if c == '+' {
                if current.chars().any(|d| d.is_ascii_digit()) {
                    runs.push(std::mem::take(&mut current));
                }
                current = String::from("+");
            } else if c.is_ascii_digit() || " .-()/".contains(c) {
                current.push(c);
            } else if !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
        }
        runs.push(current);

        runs.into_iter()
            .map(|run| run.trim_matches(|c: char| !c.is_ascii_digit() && c != '+').to_string())
            .find(|run| {
                let digits = run.chars().filter(char::is_ascii_digit).count();
                (8..=15).contains(&digits)
            })
    }

    fn words(line: &str) -> Vec<String> {
        dedup::fold(line).split(' ').map(str::to_string).collect()
    }

    fn looks_like_title(line: &str) -> bool {
        Self::words(line).iter().any(|w| TITLE_KEYWORDS.contains(&w.as_str()))
    }

    fn looks_like_organisation(line: &str) -> bool {
        let folded = dedup::fold(line);
        let words: Vec<&str> = folded.split(' ').collect();
        let has_legal_form = dedup::normalize_organisation(line) != folded;
        (has_legal_form && words.len() > 1)
            || words.iter().any(|w| ORGANISATION_KEYWORDS.contains(w))
    }

    /// "Jean-Luc de la Tour" -> ("Jean-Luc", "de la Tour"); 2 to 5 alphabetic words
    fn split_name(line: &str) -> Option<(String, String)> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if !(2..=5).contains(&parts.len()) {
            return None;
        }
        let alphabetic = parts
            .iter()
            .all(|p| p.chars().all(|c| c.is_alphabetic() || c == '-' || c == '\'' || c == '.'));
        if !alphabetic || !parts[0].chars().next().map(char::is_uppercase).unwrap_or(false) {
            return None;
        }
        Some((parts[0].to_string(), parts[1..].join(" ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_block() {
        let text = "Best regards,\n\
                    Marie Dupont\n\
                    Head of Distribution\n\
                    Acme Capital S.A.\n\
                    +352 26 12 34 56\n\
                    marie.dupont@acme-capital.lu\n\
                    https://www.acme-capital.lu";

        let contact = HeuristicExtractor::extract(text);
        assert_eq!(contact.first_name.as_deref(), Some("Marie"));
        assert_eq!(contact.last_name.as_deref(), Some("Dupont"));
        assert_eq!(contact.job_title.as_deref(), Some("Head of Distribution"));
        assert_eq!(contact.organisation.as_deref(), Some("Acme Capital S.A."));
        assert_eq!(contact.phone.as_deref(), Some("+352 26 12 34 56"));
        assert_eq!(contact.email.as_deref(), Some("marie.dupont@acme-capital.lu"));
        assert_eq!(contact.website.as_deref(), Some("https://www.acme-capital.lu"));
    }

    #[test]
    fn test_labelled_lines() {
        let text = "Name: Jean-Luc Martin\nCompany: Northwind\nTitle: Partner\nEmail: <JL.Martin@northwind.eu>\nCountry: lu";
        let contact = HeuristicExtractor::extract(text);
        assert_eq!(contact.first_name.as_deref(), Some("Jean-Luc"));
        assert_eq!(contact.last_name.as_deref(), Some("Martin"));
        assert_eq!(contact.organisation.as_deref(), Some("Northwind"));
        assert_eq!(contact.job_title.as_deref(), Some("Partner"));
        assert_eq!(contact.email.as_deref(), Some("jl.martin@northwind.eu"));
        assert_eq!(contact.country_code.as_deref(), Some("LU"));
    }

    #[test]
    fn test_phone_detection() {
        assert_eq!(
            HeuristicExtractor::find_phone("Tel. +33 1 23 45 67 89").as_deref(),
            Some("+33 1 23 45 67 89")
        );
        assert_eq!(HeuristicExtractor::find_phone("Room 12, floor 3"), None);
    }

    #[test]
    fn test_empty_text() {
        assert_eq!(HeuristicExtractor::extract("   \n  "), ExtractedContact::default());
    }
}
