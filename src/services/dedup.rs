// src/services/dedup.rs
// DOCUMENTATION: Deduplication engine behind autofill
// PURPOSE: Normalise identities, score candidates, decide create/link/skip

use crate::models::{Decision, ExtractedContact, Organisation, Person};
use std::collections::HashMap;
use uuid::Uuid;

/// Score at or above which an existing record is reused
pub const LINK_THRESHOLD: f64 = 0.9;

/// Score at or above which a match is too close to create a new record
pub const REVIEW_THRESHOLD: f64 = 0.6;

/// Mailbox providers whose domain says nothing about the employer
const FREE_MAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "outlook.com",
    "outlook.fr",
    "hotmail.com",
    "hotmail.fr",
    "live.com",
    "msn.com",
    "yahoo.com",
    "yahoo.fr",
    "icloud.com",
    "me.com",
    "aol.com",
    "proton.me",
    "protonmail.com",
    "gmx.de",
    "gmx.net",
    "web.de",
    "orange.fr",
    "free.fr",
    "wanadoo.fr",
    "laposte.net",
    "pt.lu",
];

/// Company-form tokens ignored when comparing organisation names
const LEGAL_SUFFIXES: &[&str] = &[
    "sa", "sas", "sarl", "sasu", "sca", "scs", "sci", "scsp", "sicav", "sicar", "asbl", "gmbh",
    "rl", "ag", "kg", "ltd", "limited", "llc", "llp", "lp", "inc", "plc", "bv", "nv", "spa", "srl",
    "corp", "corporation", "co", "company", "group", "groupe",
];

/// Lowercase, fold accents, drop dots/apostrophes and turn other punctuation into spaces
pub fn fold(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars().flat_map(char::to_lowercase) {
        match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => out.push('a'),
            'ç' => out.push('c'),
            'è' | 'é' | 'ê' | 'ë' => out.push('e'),
            'ì' | 'í' | 'î' | 'ï' => out.push('i'),
            'ñ' => out.push('n'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => out.push('o'),
            'ù' | 'ú' | 'û' | 'ü' => out.push('u'),
            'ý' | 'ÿ' => out.push('y'),
            'ß' => out.push_str("ss"),
            'æ' => out.push_str("ae"),
            'œ' => out.push_str("oe"),
            '.' | '\'' | '’' => {}
            c if c.is_ascii_alphanumeric() => out.push(c),
            _ => out.push(' '),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Organisation name without legal form ("Acme Capital S.A." -> "acme capital")
pub fn normalize_organisation(name: &str) -> String {
    let folded = fold(name);
    let kept: Vec<&str> = folded
        .split(' ')
        .filter(|token| !LEGAL_SUFFIXES.contains(token))
        .collect();

    if kept.is_empty() {
        folded
    } else {
        kept.join(" ")
    }
}

/// Longest token of the normalised name, used to narrow candidate lookups
pub fn significant_token(name: &str) -> Option<String> {
    normalize_organisation(name)
        .split(' ')
        .filter(|t| t.len() >= 3)
        .max_by_key(|t| t.len())
        .map(str::to_string)
}

/// Digits only, last 9 kept so +352 / 00352 / national forms compare equal
pub fn normalize_phone(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < 6 {
        return None;
    }
    let start = digits.len().saturating_sub(9);
    Some(digits[start..].to_string())
}

pub fn normalize_email(email: &str) -> Option<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Some(email),
        _ => None,
    }
}

pub fn is_free_mail(domain: &str) -> bool {
    FREE_MAIL_DOMAINS.contains(&domain)
}

/// Host of a website without scheme, "www.", port or path
pub fn website_domain(website: &str) -> Option<String> {
    let lower = website.trim().to_lowercase();
    let without_scheme = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .unwrap_or(&lower);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .split(':')
        .next()
        .unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(host);

    (host.contains('.') && !host.starts_with('.') && !host.ends_with('.')).then(|| host.to_string())
}

/// Organisation domain from the website, else from a non free-mail address
pub fn derive_domain(website: Option<&str>, email: Option<&str>) -> Option<String> {
    if let Some(domain) = website.and_then(website_domain) {
        return Some(domain);
    }

    email
        .and_then(normalize_email)
        .and_then(|e| e.split_once('@').map(|(_, d)| d.to_string()))
        .filter(|d| !is_free_mail(d))
}

fn bigrams(s: &str) -> HashMap<(char, char), usize> {
    let chars: Vec<char> = s.chars().filter(|c| !c.is_whitespace()).collect();
    let mut grams = HashMap::new();
    for pair in chars.windows(2) {
        *grams.entry((pair[0], pair[1])).or_insert(0) += 1;
    }
    grams
}

/// Sørensen-Dice coefficient over character bigrams of folded strings
pub fn similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (fold(a), fold(b));
    if a == b {
        return if a.is_empty() { 0.0 } else { 1.0 };
    }

    let (ga, gb) = (bigrams(&a), bigrams(&b));
    let total: usize = ga.values().sum::<usize>() + gb.values().sum::<usize>();
    if total == 0 {
        return 0.0;
    }

    let shared: usize = ga
        .iter()
        .map(|(gram, n)| (*n).min(*gb.get(gram).unwrap_or(&0)))
        .sum();

    (2 * shared) as f64 / total as f64
}

fn round_score(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

/// Score an existing person against extracted fields
/// DOCUMENTATION: email 1.0, phone 0.9, equal full name 0.7 (+0.2 when the
/// person belongs to the matched organisation), otherwise name similarity x 0.6
pub fn score_person(fields: &ExtractedContact, candidate: &Person, shares_organisation: bool) -> f64 {
    let mut score: f64 = 0.0;

    if let (Some(a), Some(b)) = (
        fields.email.as_deref().and_then(normalize_email),
        candidate.email.as_deref().and_then(normalize_email),
    ) {
        if a == b {
            return 1.0;
        }
    }

    if let Some(phone) = fields.phone.as_deref().and_then(normalize_phone) {
        let known = [candidate.phone.as_deref(), candidate.mobile.as_deref()];
        if known.iter().flatten().filter_map(|p| normalize_phone(p)).any(|p| p == phone) {
            score = score.max(0.9);
        }
    }

    if let Some(name) = fields.full_name() {
        let name_score = if fold(&name) == fold(&candidate.full_name()) {
            0.7 + if shares_organisation { 0.2 } else { 0.0 }
        } else {
            similarity(&name, &candidate.full_name()) * 0.6
        };
        score = score.max(name_score);
    }

    round_score(score)
}

/// Score an existing organisation: domain 1.0, normalised name 0.95, else similarity
pub fn score_organisation(name: Option<&str>, domain: Option<&str>, candidate: &Organisation) -> f64 {
    if let (Some(a), Some(b)) = (domain, candidate.domain.as_deref()) {
        if a.eq_ignore_ascii_case(b) {
            return 1.0;
        }
    }

    let Some(name) = name else {
        return 0.0;
    };

    let (a, b) = (normalize_organisation(name), normalize_organisation(&candidate.name));
    if !a.is_empty() && a == b {
        return 0.95;
    }

    round_score(similarity(&a, &b))
}

/// Threshold the best candidate into a decision
pub fn decide(best: Option<(Uuid, f64)>) -> Decision {
    match best {
        Some((id, score)) if score >= LINK_THRESHOLD => Decision::Link { id, score },
        Some((id, score)) if score >= REVIEW_THRESHOLD => Decision::Skip {
            reason: "possible duplicate".to_string(),
            candidate_id: Some(id),
            score,
        },
        _ => Decision::Create,
    }
}

fn skip(reason: &str) -> Decision {
    Decision::Skip {
        reason: reason.to_string(),
        candidate_id: None,
        score: 0.0,
    }
}

/// Highest score wins; ties keep the first (most recently updated) candidate
fn best_of(scores: impl Iterator<Item = (Uuid, f64)>) -> Option<(Uuid, f64)> {
    scores.fold(None, |best, (id, score)| match best {
        Some((_, top)) if top >= score => best,
        _ => Some((id, score)),
    })
}

pub fn decide_organisation(
    fields: &ExtractedContact,
    domain: Option<&str>,
    candidates: &[Organisation],
) -> Decision {
    let name = fields.organisation.as_deref();
    if name.is_none() && domain.is_none() {
        return skip("insufficient data");
    }

    let best = best_of(
        candidates
            .iter()
            .map(|c| (c.id, score_organisation(name, domain, c))),
    );

    match decide(best) {
        Decision::Create if name.is_none() => skip("organisation name required"),
        decision => decision,
    }
}

/// `links` holds (person_id, organisation_id) pairs for the candidates
pub fn decide_person(
    fields: &ExtractedContact,
    candidates: &[Person],
    links: &[(Uuid, Uuid)],
    matched_organisation: Option<Uuid>,
) -> Decision {
    if fields.full_name().is_none() && fields.email.is_none() {
        return skip("insufficient data");
    }

    let best = best_of(candidates.iter().map(|c| {
        let shares = matched_organisation
            .map(|org| links.iter().any(|(p, o)| *p == c.id && *o == org))
            .unwrap_or(false);
        (c.id, score_person(fields, c, shares))
    }));

    match decide(best) {
        Decision::Create if fields.first_name.is_none() || fields.last_name.is_none() => {
            skip("first and last name required")
        }
        decision => decision,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrganisationCategory, PipelineStage};
    use chrono::Utc;

    fn person(first: &str, last: &str, email: Option<&str>, phone: Option<&str>) -> Person {
        Person {
            id: Uuid::new_v4(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            mobile: None,
            job_title: None,
            linkedin_url: None,
            country_code: None,
            language: None,
            email_opt_out: false,
            opted_out_at: None,
            is_anonymized: false,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn organisation(name: &str, domain: Option<&str>) -> Organisation {
        Organisation {
            id: Uuid::new_v4(),
            name: name.to_string(),
            category: OrganisationCategory::Prospect,
            country_code: None,
            city: None,
            address: None,
            website: None,
            email: None,
            phone: None,
            domain: domain.map(str::to_string),
            aum: None,
            pipeline_stage: PipelineStage::Lead,
            notes: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn contact(first: &str, last: &str) -> ExtractedContact {
        ExtractedContact {
            first_name: Some(first.to_string()),
            last_name: Some(last.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_fold_and_legal_suffixes() {
        assert_eq!(fold("  Société Générale  "), "societe generale");
        assert_eq!(fold("J.P. Morgan & Co"), "jp morgan co");
        assert_eq!(normalize_organisation("Société Générale S.A."), "societe generale");
        assert_eq!(normalize_organisation("Acme Capital S.à r.l."), "acme capital");
        assert_eq!(normalize_organisation("Acme Capital SARL"), "acme capital");
        assert_eq!(normalize_organisation("S.A."), "sa");
        assert_eq!(significant_token("BlackRock Luxembourg SA").as_deref(), Some("luxembourg"));
    }

    #[test]
    fn test_phone_normalization() {
        assert_eq!(normalize_phone("+352 26 12 34 56").as_deref(), Some("226123456"));
        assert_eq!(normalize_phone("00352 26123456").as_deref(), Some("226123456"));
        assert_eq!(normalize_phone("12-34"), None);
    }

    #[test]
    fn test_domain_derivation() {
        assert_eq!(
            derive_domain(Some("https://www.Acme-Capital.lu/en/contact"), None).as_deref(),
            Some("acme-capital.lu")
        );
        assert_eq!(
            derive_domain(None, Some("Jane.Doe@acme-capital.lu")).as_deref(),
            Some("acme-capital.lu")
        );
        assert_eq!(derive_domain(None, Some("jane.doe@gmail.com")), None);
        assert_eq!(derive_domain(Some("not a url"), None), None);
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity("Acme", "ACME"), 1.0);
        assert_eq!(similarity("", ""), 0.0);
        assert!(similarity("Jean Dupont", "Jean Dupond") > 0.8);
        assert!(similarity("Jean Dupont", "Marie Curie") < 0.3);
    }

    #[test]
    fn test_person_email_match_links() {
        let existing = person("Jane", "Doe", Some("jane@acme.lu"), None);
        let fields = ExtractedContact {
            email: Some("JANE@acme.lu".to_string()),
            ..contact("J.", "Doe")
        };

        let decision = decide_person(&fields, &[existing.clone()], &[], None);
        assert_eq!(decision, Decision::Link { id: existing.id, score: 1.0 });
    }

    #[test]
    fn test_person_phone_match_links() {
        let existing = person("Jane", "Doe", None, Some("+352 691 123 456"));
        let fields = ExtractedContact {
            phone: Some("691123456".to_string()),
            ..contact("Janet", "Doe")
        };
        assert_eq!(score_person(&fields, &existing, false), 0.9);
    }

    #[test]
    fn test_same_name_needs_shared_organisation() {
        let existing = person("Jean", "Dupont", None, None);
        let org_id = Uuid::new_v4();
        let fields = contact("Jean", "Dupont");

        let decision = decide_person(&fields, &[existing.clone()], &[], Some(org_id));
        assert!(matches!(decision, Decision::Skip { ref reason, score, .. } if reason == "possible duplicate" && score == 0.7));

        let links = [(existing.id, org_id)];
        let decision = decide_person(&fields, &[existing.clone()], &links, Some(org_id));
        assert_eq!(decision, Decision::Link { id: existing.id, score: 0.9 });
    }

    #[test]
    fn test_unrelated_person_creates() {
        let existing = person("Marie", "Curie", Some("marie@acme.lu"), None);
        let decision = decide_person(&contact("Jean", "Dupont"), &[existing], &[], None);
        assert_eq!(decision, Decision::Create);
    }

    #[test]
    fn test_person_insufficient_data() {
        let fields = ExtractedContact {
            phone: Some("+352 691 123 456".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            decide_person(&fields, &[], &[], None),
            Decision::Skip { ref reason, .. } if reason == "insufficient data"
        ));

        let email_only = ExtractedContact {
            email: Some("someone@acme.lu".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            decide_person(&email_only, &[], &[], None),
            Decision::Skip { ref reason, .. } if reason == "first and last name required"
        ));
    }

    #[test]
    fn test_organisation_decisions() {
        let acme = organisation("Acme Capital S.A.", Some("acme-capital.lu"));

        let by_domain = ExtractedContact {
            organisation: Some("Totally Different".to_string()),
            ..Default::default()
        };
        assert_eq!(
            decide_organisation(&by_domain, Some("acme-capital.lu"), &[acme.clone()]),
            Decision::Link { id: acme.id, score: 1.0 }
        );

        let by_name = ExtractedContact {
            organisation: Some("ACME CAPITAL SARL".to_string()),
            ..Default::default()
        };
        assert_eq!(
            decide_organisation(&by_name, None, &[acme.clone()]),
            Decision::Link { id: acme.id, score: 0.95 }
        );

        let new_org = ExtractedContact {
            organisation: Some("Northwind Partners".to_string()),
            ..Default::default()
        };
        assert_eq!(decide_organisation(&new_org, None, &[acme]), Decision::Create);

        assert!(matches!(
            decide_organisation(&ExtractedContact::default(), None, &[]),
            Decision::Skip { ref reason, .. } if reason == "insufficient data"
        ));
        assert!(matches!(
            decide_organisation(&ExtractedContact::default(), Some("new.lu"), &[]),
            Decision::Skip { ref reason, .. } if reason == "organisation name required"
        ));
    }

    #[test]
    fn test_thresholds() {
        let id = Uuid::new_v4();
        assert_eq!(decide(None), Decision::Create);
        assert_eq!(decide(Some((id, 0.59))), Decision::Create);
        assert!(matches!(decide(Some((id, 0.6))), Decision::Skip { .. }));
        assert_eq!(decide(Some((id, 0.9))), Decision::Link { id, score: 0.9 });
    }
}
