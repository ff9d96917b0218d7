//! End-to-end pipeline scenarios: store building, detection, linking,
//! training round-trips, and filtering.

use medlink_core::cdb::{prepare_names, ConceptEntry, NameStatus};
use medlink_core::core::Cui;
use medlink_core::{ConceptStore, Config, Pipeline, Vocab};

fn two_concept_store() -> ConceptStore {
    let mut store = ConceptStore::default();
    for (cui, raw) in [("C01", "kidney failure"), ("C02", "diabetes")] {
        let names = prepare_names([raw], "~");
        store.add_concept(
            ConceptEntry::new(Cui::from(cui), names).with_status(NameStatus::Primary),
            false,
        );
    }
    store
}

fn embedding_vocab() -> Vocab {
    let mut vocab = Vocab::new();
    for (word, vector) in [
        ("patient", vec![0.3, 0.2, 0.1]),
        ("has", vec![0.1, 0.2, 0.3]),
        ("and", vec![0.2, 0.2, 0.2]),
        ("kidney", vec![1.0, 0.1, 0.0]),
        ("failure", vec![0.1, 1.0, 0.0]),
        ("diabetes", vec![0.0, 0.1, 1.0]),
        ("insulin", vec![0.0, 0.3, 0.9]),
    ] {
        vocab.add_word(word, 100, Some(vector), true);
    }
    vocab
}

#[test]
fn untrained_inference_accepts_direct_links() {
    let mut config = Config::default();
    config.linking.train = false;
    config.linking.similarity_threshold = 0.25;

    let mut pipeline = Pipeline::new(config, two_concept_store(), embedding_vocab()).unwrap();
    let doc = pipeline
        .annotate("patient has kidney failure and diabetes")
        .unwrap();

    // Single-candidate, non-ambiguous, above the length floor: both fall
    // back to similarity 1 and pass the static threshold
    assert_eq!(doc.final_mentions.len(), 2);
    let mut linked: Vec<(&str, f32)> = doc
        .final_mentions
        .iter()
        .map(|m| (m.cui.as_ref().unwrap().as_str(), m.context_similarity))
        .collect();
    linked.sort_by(|a, b| a.0.cmp(b.0));
    assert_eq!(linked, vec![("C01", 1.0), ("C02", 1.0)]);
}

#[test]
fn untrained_inference_rejects_when_similarity_is_forced() {
    let mut config = Config::default();
    config.linking.train = false;
    config.linking.always_calculate_similarity = true;
    config.linking.similarity_threshold = 0.25;

    let mut pipeline = Pipeline::new(config, two_concept_store(), embedding_vocab()).unwrap();
    let doc = pipeline
        .annotate("patient has kidney failure and diabetes")
        .unwrap();

    // Both concepts are below the training-count threshold: similarity is
    // the -1 sentinel and the static threshold rejects everything
    assert!(doc.final_mentions.is_empty());
}

#[test]
fn training_then_inference_round_trip() {
    let mut config = Config::default();
    config.linking.train = true;
    config.linking.random_replacement_unsupervised = 1.0;
    config.linking.negative_probability = 0.0;

    let mut pipeline = Pipeline::new(config, two_concept_store(), embedding_vocab()).unwrap();
    for _ in 0..3 {
        pipeline
            .annotate("patient has kidney failure and diabetes")
            .unwrap();
    }
    assert_eq!(
        pipeline.store().cui_info(&Cui::from("C01")).unwrap().count_train,
        3
    );

    // Switch to inference with forced similarity: the trained concepts now
    // score high on the same kind of context
    pipeline.config_mut().linking.train = false;
    pipeline.config_mut().linking.always_calculate_similarity = true;
    let doc = pipeline
        .annotate("patient has kidney failure and diabetes")
        .unwrap();
    assert_eq!(doc.final_mentions.len(), 2);
    for mention in &doc.final_mentions {
        assert!(
            mention.context_similarity > 0.25,
            "similarity was {}",
            mention.context_similarity
        );
    }
}

#[test]
fn ambiguous_name_is_disambiguated_by_context() {
    let mut store = ConceptStore::default();
    // "kf" is ambiguous between two concepts
    for cui in ["C01", "C02"] {
        let names = prepare_names(["kidney failure"], "~");
        store.add_concept(
            ConceptEntry::new(Cui::from(cui), names).with_status(NameStatus::Automatic),
            false,
        );
    }

    let mut config = Config::default();
    config.linking.train = false;
    config.linking.random_replacement_unsupervised = 1.0;
    config.linking.prefer_frequent_concepts = 0.0;
    config.linking.prefer_primary_name = 0.0;

    let mut pipeline = Pipeline::new(config, store, embedding_vocab()).unwrap();

    // Teach C01 the renal context and C02 the diabetic context by hand
    let doc = pipeline.tokenize("patient has kidney failure and diabetes");
    let mention = medlink_core::Mention {
        start_token: 2,
        end_token: 3,
        start: doc.tokens[2].start,
        end: doc.tokens[3].end,
        text: "kidney failure".to_string(),
        detected_name: Some("kidney~failure".to_string()),
        link_candidates: vec![Cui::from("C01"), Cui::from("C02")],
        cui: None,
        context_similarity: 0.0,
    };
    pipeline
        .train_on(&Cui::from("C01"), &mention, &doc, false, &[])
        .unwrap();

    let other_doc = pipeline.tokenize("insulin diabetes insulin diabetes kidney failure");
    let other_mention = medlink_core::Mention {
        start_token: 4,
        end_token: 5,
        start: other_doc.tokens[4].start,
        end: other_doc.tokens[5].end,
        text: "kidney failure".to_string(),
        detected_name: Some("kidney~failure".to_string()),
        link_candidates: vec![Cui::from("C01"), Cui::from("C02")],
        cui: None,
        context_similarity: 0.0,
    };
    pipeline
        .train_on(&Cui::from("C02"), &other_mention, &other_doc, false, &[])
        .unwrap();

    let doc = pipeline
        .annotate("patient has kidney failure and diabetes")
        .unwrap();
    let kf = doc
        .final_mentions
        .iter()
        .find(|m| m.text == "kidney failure")
        .expect("kidney failure mention linked");
    assert_eq!(kf.cui, Some(Cui::from("C01")));
}

#[test]
fn negative_supervision_tightens_name_status() {
    let mut config = Config::default();
    config.linking.random_replacement_unsupervised = 1.0;
    let mut pipeline = Pipeline::new(config, two_concept_store(), embedding_vocab()).unwrap();

    let doc = pipeline.tokenize("patient has kidney failure");
    let mention = medlink_core::Mention {
        start_token: 2,
        end_token: 3,
        start: doc.tokens[2].start,
        end: doc.tokens[3].end,
        text: "kidney failure".to_string(),
        detected_name: Some("kidney~failure".to_string()),
        link_candidates: vec![Cui::from("C01")],
        cui: None,
        context_similarity: 0.0,
    };
    pipeline
        .train_on(
            &Cui::from("C01"),
            &mention,
            &doc,
            true,
            &["kidney~failure".to_string()],
        )
        .unwrap();

    // The primary tag is demoted to primary-with-forced-disambiguation
    assert_eq!(
        pipeline
            .store()
            .name_info("kidney~failure")
            .unwrap()
            .status_for(&Cui::from("C01")),
        NameStatus::PrimaryWithDisambiguation
    );
}

#[test]
fn store_filtering_shrinks_detection() {
    let mut store = two_concept_store();
    let keep = std::collections::HashSet::from([Cui::from("C01")]);
    store.filter_by_cui(&keep);

    let mut config = Config::default();
    config.linking.train = false;
    let mut pipeline = Pipeline::new(config, store, embedding_vocab()).unwrap();
    let doc = pipeline
        .annotate("patient has kidney failure and diabetes")
        .unwrap();

    assert_eq!(doc.final_mentions.len(), 1);
    assert_eq!(doc.final_mentions[0].cui, Some(Cui::from("C01")));
}

#[test]
fn overlapping_detection_prefers_longest_span() {
    let mut store = two_concept_store();
    let names = prepare_names(["kidney"], "~");
    store.add_concept(
        ConceptEntry::new(Cui::from("C03"), names).with_status(NameStatus::Primary),
        false,
    );

    let mut config = Config::default();
    config.linking.train = false;
    let mut pipeline = Pipeline::new(config, store, embedding_vocab()).unwrap();
    let doc = pipeline.annotate("patient has kidney failure").unwrap();

    assert_eq!(doc.final_mentions.len(), 1);
    assert_eq!(doc.final_mentions[0].text, "kidney failure");
    assert_eq!(doc.final_mentions[0].cui, Some(Cui::from("C01")));
}

#[test]
fn preferred_name_survives_round_trip() {
    let store = two_concept_store();
    let raw = store.to_json_string().unwrap();
    let loaded = ConceptStore::from_json_str(&raw).unwrap();
    assert_eq!(loaded.get_name(&Cui::from("C01")), "kidney failure");

    let mut config = Config::default();
    config.linking.train = false;
    let mut pipeline = Pipeline::new(config, loaded, embedding_vocab()).unwrap();
    let doc = pipeline.annotate("patient has kidney failure").unwrap();
    assert_eq!(doc.final_mentions.len(), 1);
}
