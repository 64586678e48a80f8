use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use easyvisa_classifiers::config::{CapFitScope, ModelType, PreprocessConfig};
use easyvisa_classifiers::data_handling::{ApplicationRecord, CaseStatus, Feature};
use easyvisa_classifiers::evaluation::{evaluate, normalize_label, RawLabel};
use easyvisa_classifiers::preprocessing::{cap_at_quantile, OutlierCapper, Preprocessor};
use easyvisa_classifiers::trainer::{train_model, ModelSpec};

const CONTINENTS: [&str; 6] = ["Africa", "Asia", "Europe", "North America", "Oceania", "South America"];
const EDUCATION: [&str; 4] = ["Bachelor's", "Doctorate", "High School", "Master's"];
const REGIONS: [&str; 5] = ["Island", "Midwest", "Northeast", "South", "West"];
const UNITS: [&str; 4] = ["Hour", "Month", "Week", "Year"];

/// Applications whose outcome mostly follows education and job experience.
fn synthetic_records(n: usize, seed: u64) -> Vec<ApplicationRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let education = EDUCATION[i % EDUCATION.len()];
            let experienced = rng.gen_bool(0.6);
            let mut score = match education {
                "Doctorate" | "Master's" => 0.8,
                "Bachelor's" => 0.6,
                _ => 0.3,
            };
            if experienced {
                score += 0.1;
            }
            let status = if rng.gen_bool(score) {
                CaseStatus::Certified
            } else {
                CaseStatus::Denied
            };
            // a heavy right tail so the caps bite
            let wage = if rng.gen_bool(0.05) {
                rng.gen_range(200_000.0..1_000_000.0)
            } else {
                rng.gen_range(1_000.0..150_000.0)
            };
            ApplicationRecord {
                case_id: format!("EZYV{}", i + 1),
                continent: CONTINENTS[i % CONTINENTS.len()].to_string(),
                education_of_employee: education.to_string(),
                has_job_experience: if experienced { "Y" } else { "N" }.to_string(),
                requires_job_training: if i % 7 == 0 { "Y" } else { "N" }.to_string(),
                no_of_employees: rng.gen_range(10.0..20_000.0),
                yr_of_estab: rng.gen_range(1850..2016) as f64,
                region_of_employment: REGIONS[i % REGIONS.len()].to_string(),
                prevailing_wage: wage,
                unit_of_wage: UNITS[i % UNITS.len()].to_string(),
                full_time_position: if i % 9 == 0 { "N" } else { "Y" }.to_string(),
                case_status: status,
            }
        })
        .collect()
}

fn certified_share(labels: &[CaseStatus]) -> f64 {
    labels.iter().filter(|s| s.is_certified()).count() as f64 / labels.len() as f64
}

// ---------------------------------------------------------------------------
// Encoding and capping bounds
// ---------------------------------------------------------------------------

#[test]
fn encoded_codes_and_caps_stay_in_range() {
    let records = synthetic_records(1200, 7);
    let output = Preprocessor::new(PreprocessConfig::default()).run(&records).unwrap();
    let bounds = output.fitted.capper().bounds().to_vec();
    assert_eq!(bounds.len(), 2);

    for data in [output.partition.train(), output.partition.test()] {
        data.check_feature_ranges().unwrap();
        for (j, card) in data.cardinality().iter().enumerate() {
            if let Some(k) = card {
                assert!(data.x().column(j).iter().all(|&v| v >= 0.0 && v < *k as f64));
            }
        }
        for (feature, bound) in &bounds {
            let col = data.x().column(feature.index());
            assert!(col.iter().all(|&v| v <= *bound), "{} exceeds {}", feature, bound);
        }
    }
}

// ---------------------------------------------------------------------------
// Split properties
// ---------------------------------------------------------------------------

#[test]
fn split_is_a_strict_stratified_partition() {
    let records = synthetic_records(2000, 11);
    let output = Preprocessor::new(PreprocessConfig::default()).run(&records).unwrap();
    let train = output.partition.train();
    let test = output.partition.test();

    let mut ids: Vec<usize> = train.row_ids().iter().chain(test.row_ids()).copied().collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..records.len()).collect::<Vec<_>>());
    assert_eq!(test.n_rows(), 400);

    let all: Vec<CaseStatus> = records.iter().map(|r| r.case_status).collect();
    let overall = certified_share(&all);
    assert!((certified_share(train.y()) - overall).abs() <= 0.02);
    assert!((certified_share(test.y()) - overall).abs() <= 0.02);
}

#[test]
fn preprocessing_is_deterministic() {
    let records = synthetic_records(500, 3);
    let pre = Preprocessor::new(PreprocessConfig::default());
    let first = pre.run(&records).unwrap();
    let second = pre.run(&records).unwrap();
    assert_eq!(first, second);

    let other_seed = Preprocessor::new(PreprocessConfig {
        seed: 43,
        ..PreprocessConfig::default()
    })
    .run(&records)
    .unwrap();
    assert_ne!(first.split, other_seed.split);
}

#[test]
fn ten_rows_seven_certified() {
    let mut records = synthetic_records(10, 1);
    for (i, r) in records.iter_mut().enumerate() {
        // single-valued categories so every test value is known to the encoder
        r.continent = "Asia".to_string();
        r.education_of_employee = "Master's".to_string();
        r.has_job_experience = "Y".to_string();
        r.requires_job_training = "N".to_string();
        r.region_of_employment = "West".to_string();
        r.unit_of_wage = "Year".to_string();
        r.full_time_position = "Y".to_string();
        r.case_status = if i < 7 {
            CaseStatus::Certified
        } else {
            CaseStatus::Denied
        };
    }
    let output = Preprocessor::new(PreprocessConfig::default()).run(&records).unwrap();
    let train = output.partition.train();
    let test = output.partition.test();
    assert_eq!(train.n_rows(), 8);
    assert_eq!(test.n_rows(), 2);

    let (_, train_certified) = train.class_counts();
    let (_, test_certified) = test.class_counts();
    assert!(train_certified >= 5);
    assert_eq!(train_certified + test_certified, 7);
    // stratified share of the test side is 0.2 * 7 = 1.4 certified rows
    assert!((test_certified as f64 - 1.4).abs() <= 1.0);
}

// ---------------------------------------------------------------------------
// Capping scenario
// ---------------------------------------------------------------------------

#[test]
fn cap_at_one_hundred_thousand() {
    let mut wages: Vec<f64> = (0..19).map(|i| 50_000.0 + 1_000.0 * i as f64).collect();
    wages.push(100_000.0);
    wages.push(250_000.0);

    let (bound, capped) = cap_at_quantile(&wages, 0.95).unwrap();
    assert_eq!(bound, 100_000.0);
    for (before, after) in wages.iter().zip(&capped) {
        if *before <= 100_000.0 {
            assert_eq!(before, after);
        } else {
            assert_eq!(*after, 100_000.0);
        }
    }

    let mut records = synthetic_records(wages.len(), 5);
    for (r, w) in records.iter_mut().zip(&wages) {
        r.prevailing_wage = *w;
    }
    let capper = OutlierCapper::fit(&records, &[Feature::PrevailingWage], 0.95).unwrap();
    let transformed = capper.transform(&records);
    assert_eq!(transformed[20].prevailing_wage, 100_000.0);
    assert_eq!(transformed[3].prevailing_wage, 53_000.0);
    // capping twice changes nothing
    assert_eq!(capper.transform(&transformed), transformed);
}

#[test]
fn full_scope_caps_use_every_row() {
    let records = synthetic_records(400, 9);
    let config = PreprocessConfig {
        cap_fit_scope: CapFitScope::Full,
        ..PreprocessConfig::default()
    };
    let output = Preprocessor::new(config).run(&records).unwrap();
    let expected = OutlierCapper::fit(&records, &[Feature::PrevailingWage, Feature::NoOfEmployees], 0.95)
        .unwrap();
    assert_eq!(output.fitted.capper(), &expected);
}

// ---------------------------------------------------------------------------
// Evaluation scenarios
// ---------------------------------------------------------------------------

#[test]
fn label_normalization_is_a_bijection() {
    let text = ["Certified", "Denied"];
    let codes = [1i64, 0];
    for (t, c) in text.iter().zip(codes) {
        let from_text = normalize_label(&RawLabel::from(*t)).unwrap();
        let from_code = normalize_label(&RawLabel::Code(c)).unwrap();
        assert_eq!(from_text, from_code);
        assert_eq!(from_text.code() as i64, c);
        // applying the mapping to its own output gives the same label
        assert_eq!(normalize_label(&RawLabel::from(from_text)).unwrap(), from_text);
    }
    assert_ne!(
        normalize_label(&RawLabel::Code(1)).unwrap(),
        normalize_label(&RawLabel::Code(0)).unwrap()
    );
    assert!(normalize_label(&RawLabel::from("certified?")).is_err());
}

#[test]
fn duplicated_train_and_test_give_equal_accuracy() {
    let records = synthetic_records(300, 21);
    let output = Preprocessor::new(PreprocessConfig::default()).run(&records).unwrap();
    let train = output.partition.train();

    let spec = ModelSpec::new("Decision Tree", ModelType::pruned_decision_tree());
    let model = train_model(&spec, train).unwrap();
    let result = evaluate(&model, train, train).unwrap();
    assert_eq!(result.train_accuracy, result.test_accuracy);
    assert_eq!(result.overfit_gap(), 0.0);
}
