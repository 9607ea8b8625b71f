use std::collections::HashSet;

use anonymizer_core::{reverse, AnonymizationSession, Entity, PlaceholderMap};

#[test]
fn document_roundtrip_restores_original_text() {
    let chunks = sample_chunks();
    let mut session = AnonymizationSession::new();
    let mut anonymized = Vec::new();
    for (text, entities) in &chunks {
        anonymized.push(session.anonymize_chunk(text, entities).expect("anonymize"));
    }
    let done = session.finish(&anonymized);

    assert!(!done.text.contains("Alice Martin"));
    assert!(!done.text.contains("alice@example.org"));

    let original = chunks
        .iter()
        .map(|(text, _)| text.as_str())
        .collect::<Vec<_>>()
        .join(anonymizer_core::PAGE_BREAK);
    let (restored, stats) = reverse(&done.text, &done.mapping);
    assert_eq!(restored, original);
    assert!(stats.is_clean());
}

#[test]
fn final_mapping_is_injective() {
    let chunks = sample_chunks();
    let mut session = AnonymizationSession::new();
    let anonymized: Vec<String> = chunks
        .iter()
        .map(|(text, entities)| session.anonymize_chunk(text, entities).unwrap())
        .collect();
    let done = session.finish(&anonymized);
    let mut values = HashSet::new();
    for (_, original) in done.mapping.iter() {
        assert!(values.insert(original), "{original} mapped twice");
    }
}

#[test]
fn persisted_mapping_reverses_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mappings/report.mapping.json");
    let mut session = AnonymizationSession::new();
    let chunk = session
        .anonymize_chunk(
            "Invoice for Alice Martin, 12 Rue Cler.",
            &[
                Entity::canonical("Alice Martin", "person"),
                Entity::canonical("12 Rue Cler", "address"),
            ],
        )
        .unwrap();
    let done = session.finish(&[chunk]);
    done.mapping.save(&path).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["PERSON_1"], "Alice Martin");
    assert_eq!(raw["ADDRESS_1"], "12 Rue Cler");

    let reloaded = PlaceholderMap::load(&path).unwrap();
    let (restored, _) = reverse(&done.text, &reloaded);
    assert_eq!(restored, "Invoice for Alice Martin, 12 Rue Cler.");
}

#[test]
fn placeholders_glued_to_text_survive_finish_and_reverse() {
    let chunks = [
        (
            "张三在北京工作",
            vec![
                Entity::canonical("张三", "PERSON"),
                Entity::canonical("北京", "LOCATION"),
            ],
        ),
        ("Anna met Annabel.", vec![Entity::canonical("Anna", "PERSON")]),
        ("ACME-ID:XSmith", vec![Entity::canonical("Smith", "PERSON")]),
    ];
    let mut session = AnonymizationSession::new();
    let anonymized: Vec<String> = chunks
        .iter()
        .map(|(text, entities)| session.anonymize_chunk(text, entities).unwrap())
        .collect();
    assert_eq!(anonymized[0], "PERSON_1在LOCATION_1工作");
    assert_eq!(anonymized[1], "PERSON_2 met PERSON_2bel.");
    assert_eq!(anonymized[2], "ACME-ID:XPERSON_3");

    let done = session.finish(&anonymized);
    assert_eq!(done.pruned, 0);
    assert_eq!(done.mapping.len(), 4);

    let original = chunks
        .iter()
        .map(|(text, _)| *text)
        .collect::<Vec<_>>()
        .join(anonymizer_core::PAGE_BREAK);
    let (restored, stats) = reverse(&done.text, &done.mapping);
    assert_eq!(restored, original);
    assert!(stats.is_clean());
}

fn sample_chunks() -> Vec<(String, Vec<Entity>)> {
    vec![
        (
            "Alice Martin (alice@example.org) joined Northwind Traders as CFO.".to_string(),
            vec![
                Entity::canonical("Alice Martin", "PERSON"),
                Entity::canonical("alice@example.org", "EMAIL"),
                Entity::canonical("Northwind Traders", "ORGANIZATION"),
                Entity::canonical("CFO", "JOB_TITLE"),
            ],
        ),
        (
            "Ms. Alice Martin met Bob Stone in Lisbon.".to_string(),
            vec![
                Entity::new("Ms. Alice Martin", "PERSON", "Alice Martin"),
                Entity::canonical("Bob Stone", "PERSON"),
                Entity::canonical("Lisbon", "LOCATION"),
            ],
        ),
        (
            "Northwind Traders thanks Bob Stone.".to_string(),
            vec![
                Entity::canonical("Northwind Traders", "ORGANIZATION"),
                Entity::canonical("Bob Stone", "PERSON"),
            ],
        ),
    ]
}
