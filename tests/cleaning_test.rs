use anyhow::Result;

use entity_enrich::config::DatasetConfig;
use entity_enrich::domain::{Entity, EntityData};
use entity_enrich::pipeline::processing::cleaning::{CleanOptions, Cleaner, CleaningIssueKind};

fn cleaner(lookups: &str) -> Result<Cleaner> {
    let dataset = DatasetConfig::from_toml_str(&format!("name = \"test\"\n{}", lookups))?;
    Ok(Cleaner::new(dataset.lookups))
}

#[test]
fn test_lookup_splits_value_across_properties() -> Result<()> {
    let cleaner = cleaner(
        r#"
        [[lookups."type.name".options]]
        match = ["Umbrella Corp (aka Umbrella Pharmaceuticals)"]
        value = "Umbrella Corp"
        targets = [{ prop = "alias", value = "Umbrella Pharmaceuticals" }]
        "#,
    )?;
    let mut company = Entity::new("Company")?.with_id("osv-umbrella-corp");
    let issues = company.add_with(
        &cleaner,
        "name",
        Some("umbrella  corp (AKA Umbrella Pharmaceuticals)"),
        CleanOptions::default(),
    )?;
    assert!(issues.is_empty());
    assert_eq!(company.get("name"), vec!["Umbrella Corp"]);
    assert_eq!(company.get("alias"), vec!["Umbrella Pharmaceuticals"]);
    Ok(())
}

#[test]
fn test_lookup_can_drop_and_redirect() -> Result<()> {
    let cleaner = cleaner(
        r#"
        [[lookups."type.string".options]]
        match = "n/a"

        [[lookups."type.date".options]]
        regex = "^unknown"

        [[lookups."type.identifier".options]]
        match = "SWIFT ABCDDEFF"
        prop = "bicCode"
        value = "ABCDDEFF"

        [[lookups."type.identifier".options]]
        match = "IMO 9074729"
        prop = "warpDrive"
        value = "9074729"
        "#,
    )?;
    let mut company = Entity::new("Company")?.with_id("c1");
    company.add_with(&cleaner, "capital", Some("N/A"), CleanOptions::default())?;
    company.add_with(&cleaner, "incorporationDate", Some("unknown (1990s)"), CleanOptions::default())?;
    company.add_with(&cleaner, "registrationNumber", Some("SWIFT ABCDDEFF"), CleanOptions::default())?;
    company.add_with(&cleaner, "registrationNumber", Some("IMO 9074729"), CleanOptions::default())?;

    assert!(!company.has("capital"));
    assert!(!company.has("incorporationDate"));
    assert_eq!(company.get("bicCode"), vec!["ABCDDEFF"]);
    assert!(!company.has("registrationNumber"));
    Ok(())
}

#[test]
fn test_raw_record_cleaning() -> Result<()> {
    let data: EntityData = serde_json::from_str(
        r#"{
            "id": "osv-oswell-spencer",
            "schema": "Person",
            "properties": {
                "name": ["  Oswell   E. Spencer "],
                "birthDate": ["1940-02-11T00:00:00Z"],
                "country": ["Germany"],
                "phone": ["030 1234 5678", "call the front desk"],
                "email": ["mailto:Oswell@Umbrella.COM", "not an email"],
                "gender": ["M"]
            }
        }"#,
    )?;
    let (person, issues) = Entity::from_raw(&data, &Cleaner::default())?;

    assert_eq!(person.get("name"), vec!["Oswell E. Spencer"]);
    assert_eq!(person.get("birthDate"), vec!["1940-02-11"]);
    assert_eq!(person.get("country"), vec!["de"]);
    assert_eq!(person.get("email"), vec!["Oswell@umbrella.com"]);
    assert_eq!(person.get("gender"), vec!["male"]);
    assert!(person.get("phone").contains(&"call the front desk"));
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, CleaningIssueKind::Rejected);
    assert_eq!(issues[0].prop, "email");
    Ok(())
}

#[test]
fn test_identifier_checks() -> Result<()> {
    let mut account = Entity::new("BankAccount")?.with_id("acc-1");
    let bad = account.add_with(
        &Cleaner::default(),
        "iban",
        Some("DE89 3704 0044 0532 0130 01"),
        CleanOptions::default(),
    )?;
    assert_eq!(bad.len(), 1);
    assert_eq!(bad[0].kind, CleaningIssueKind::IdentifierFallback);
    assert_eq!(bad[0].entity_id.as_deref(), Some("acc-1"));
    assert_eq!(account.get("iban"), vec!["DE89 3704 0044 0532 0130 01"]);

    let mut vessel = Entity::new("Vessel")?.with_id("v1");
    vessel.add("imoNumber", "9074729")?;
    assert_eq!(vessel.get("imoNumber"), vec!["IMO9074729"]);

    let mut security = Entity::new("Security")?.with_id("s1");
    security.add("isin", "us0378331005")?;
    assert_eq!(security.get("isin"), vec!["US0378331005"]);
    Ok(())
}

#[test]
fn test_format_hint_and_fuzzy_dates() -> Result<()> {
    let cleaner = Cleaner::default();
    let mut sanction = Entity::new("Sanction")?.with_id("s1");
    sanction.add_with(&cleaner, "listingDate", Some("13/06/1982"), CleanOptions::with_format("%d/%m/%Y"))?;
    sanction.add_with(&cleaner, "startDate", Some("listed in 1999 by the council"), CleanOptions::fuzzy())?;
    sanction.add_with(&cleaner, "endDate", Some("listed in 1999 by the council"), CleanOptions::default())?;

    assert_eq!(sanction.get("listingDate"), vec!["1982-06-13"]);
    assert_eq!(sanction.get("startDate"), vec!["1999"]);
    assert!(!sanction.has("endDate"));
    Ok(())
}
