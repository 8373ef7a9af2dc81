use accelprofile::config::AppConfig;
use accelprofile::models::{ErrorKind, FitWarning, Sample, SampleId};
use accelprofile::{ProfilingPipeline, SampleStore, SolverKind};
use chrono::{Duration, NaiveDate};

/// End-to-end tests of the cleaning and fitting pipeline

struct SyntheticAthlete {
    name: &'static str,
    a0: f64,
    s0: f64,
}

const ATHLETES: [SyntheticAthlete; 2] = [
    SyntheticAthlete {
        name: "Alice",
        a0: 8.0,
        s0: 9.0,
    },
    SyntheticAthlete {
        name: "Bruno",
        a0: 7.5,
        s0: 9.5,
    },
];

/// 50 points on each athlete's profile line plus 5 readings at ten times
/// the expected acceleration
fn synthetic_session() -> (Vec<Sample>, Vec<SampleId>) {
    let date = NaiveDate::from_ymd_opt(2023, 5, 3).unwrap();
    let start = date.and_hms_opt(10, 0, 0).unwrap();
    let mut samples = Vec::new();
    let mut outliers = Vec::new();

    for athlete in &ATHLETES {
        let acceleration = |speed: f64| athlete.a0 - athlete.a0 / athlete.s0 * speed;

        for i in 0..50 {
            let speed = 0.2 + i as f64 * (8.6 / 49.0);
            samples.push(Sample {
                id: SampleId(samples.len()),
                athlete: athlete.name.to_string(),
                timestamp: start + Duration::milliseconds(100 * samples.len() as i64),
                date,
                speed,
                acceleration: acceleration(speed),
            });
        }

        for speed in [2.0, 3.0, 4.0, 5.0, 6.0] {
            let id = SampleId(samples.len());
            outliers.push(id);
            samples.push(Sample {
                id,
                athlete: athlete.name.to_string(),
                timestamp: start + Duration::milliseconds(100 * samples.len() as i64),
                date,
                speed,
                acceleration: 10.0 * acceleration(speed),
            });
        }
    }

    (samples, outliers)
}

fn within(actual: f64, expected: f64, tolerance: f64) -> bool {
    (actual - expected).abs() <= expected.abs() * tolerance
}

#[test]
fn test_outliers_flagged_and_profiles_recovered() {
    let (samples, outliers) = synthetic_session();
    let report = ProfilingPipeline::from_config(&AppConfig::default()).run(SampleStore::admit(samples));

    // Five envelope hits per day stay below the misuse threshold
    assert!(report.misuse.is_empty());
    assert_eq!(report.measurement.kind, ErrorKind::Measurement);
    let flagged: Vec<SampleId> = report.measurement.samples.iter().map(|f| f.sample.id).collect();
    assert_eq!(flagged, outliers);
    assert!(report
        .measurement
        .samples
        .iter()
        .all(|f| f.cluster_label == Some(-1)));

    let linear = report.linear.as_ref().unwrap();
    let quantile = report.quantile.as_ref().unwrap();
    for athlete in &ATHLETES {
        let profile = &linear[athlete.name];
        assert!(profile.is_trained());
        assert!(within(profile.a0().unwrap(), athlete.a0, 0.05));
        assert!(within(profile.s0().unwrap(), athlete.s0, 0.05));

        let band = &quantile[athlete.name];
        assert_eq!(band.fits.len(), 91);
        assert!(within(band.mean_a0, athlete.a0, 0.05));
        assert!(within(band.mean_s0, athlete.s0, 0.05));
    }
    assert!(report.warnings.is_empty());
}

#[test]
fn test_exact_solver_recovers_profiles() {
    let (samples, _) = synthetic_session();
    let mut config = AppConfig::default();
    config.regression.linear = false;
    config.regression.solver = SolverKind::Exact;

    let report = ProfilingPipeline::from_config(&config).run(SampleStore::admit(samples));

    assert!(report.linear.is_none());
    let quantile = report.quantile.as_ref().unwrap();
    for athlete in &ATHLETES {
        let band = &quantile[athlete.name];
        assert!(within(band.mean_a0, athlete.a0, 0.05));
        assert!(within(band.mean_s0, athlete.s0, 0.05));
        assert!(band.std_a0 < 1e-6);
    }
}

#[test]
fn test_cleaning_is_idempotent() {
    let (samples, _) = synthetic_session();
    let pipeline = ProfilingPipeline::default();
    let report = pipeline.run(SampleStore::admit(samples));

    let (after_misuse, misuse) = pipeline.misuse.apply(&report.cleaned);
    let (after_cluster, measurement) = pipeline.cluster.apply(&after_misuse);

    assert!(misuse.is_empty());
    assert!(measurement.is_empty());
    assert_eq!(after_cluster, report.cleaned);
}

#[test]
fn test_partition_of_admitted_samples() {
    let (samples, _) = synthetic_session();
    let report = ProfilingPipeline::default().run(SampleStore::admit(samples));

    let kept = report.cleaned.ids();
    let removed = report.measurement.ids();
    assert!(kept.is_disjoint(&removed));
    assert!(kept.is_disjoint(&report.misuse.ids()));
    assert_eq!(
        kept.len() + removed.len() + report.misuse.len(),
        report.admitted.len()
    );
}

#[test]
fn test_misused_day_removes_athlete_from_profiles() {
    let (mut samples, _) = synthetic_session();
    let date = NaiveDate::from_ymd_opt(2023, 5, 4).unwrap();

    // Twelve readings above the plausibility ceiling on one day
    for i in 0..12 {
        samples.push(Sample {
            id: SampleId(samples.len()),
            athlete: "Chloe".to_string(),
            timestamp: date.and_hms_opt(9, 0, i).unwrap(),
            date,
            speed: 1.0 + i as f64 * 0.05,
            acceleration: 11.0,
        });
    }

    let report = ProfilingPipeline::default().run(SampleStore::admit(samples));

    assert_eq!(report.misuse.len(), 12);
    assert!(report.misuse.samples.iter().all(|f| f.flagged_count == Some(12)));
    assert!(report.cohort.contains("Chloe"));
    assert_eq!(report.unprofiled_athletes(), vec!["Chloe"]);
    assert!(!report.linear.as_ref().unwrap().contains_key("Chloe"));

    let table = report.profile_table().unwrap();
    let names: Vec<&str> = table.rows.iter().map(|r| r.athlete.as_str()).collect();
    assert_eq!(names, vec!["Alice", "Bruno"]);
}

#[test]
fn test_single_speed_athlete_gets_placeholder() {
    let date = NaiveDate::from_ymd_opt(2023, 5, 3).unwrap();
    let samples: Vec<Sample> = (0..6)
        .map(|i| Sample {
            id: SampleId(i),
            athlete: "Dora".to_string(),
            timestamp: date.and_hms_opt(11, 0, i as u32).unwrap(),
            date,
            speed: 3.0,
            acceleration: 2.0 + i as f64 * 0.05,
        })
        .collect();

    let mut config = AppConfig::default();
    config.regression.quantile = false;
    let report = ProfilingPipeline::from_config(&config).run(SampleStore::admit(samples));

    let profile = &report.linear.as_ref().unwrap()["Dora"];
    assert!(!profile.is_trained());
    assert!(matches!(
        report.warnings.as_slice(),
        [FitWarning::InsufficientData { athlete, .. }] if athlete == "Dora"
    ));
}
