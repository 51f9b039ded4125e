use std::io::Write;

use assert_approx_eq::assert_approx_eq;
use epispace::prelude::*;
use serde_json::json;

fn parameters(extra: serde_json::Value) -> Parameters {
    let mut value = json!({
        "seed": 7,
        "dt": 1.0,
        "max_time": 20.0,
        "box": {"left": 0.0, "right": 50.0, "bottom": 0.0, "top": 50.0},
        "hospital_capacity": 2,
        "icu_capacity": 0,
        "infection_state": "infected",
        "disease_groups": [
            {"name": "susceptible", "can_get_infected": true},
            {"name": "infected", "is_infected": true, "can_spread": true,
             "spread_radius": 3.0, "spread_probability": 0.5, "avoidance_radius": 2.0,
             "diagnosis_probability": {"dist_type": "constant", "constant": 0.2},
             "isolation_days": {"dist_type": "constant", "constant": 5.0}},
            {"name": "recovered",
             "immunization_time": {"dist_type": "constant", "constant": 10.0}},
            {"name": "dead", "is_dead": true}
        ],
        "transitions": [
            {"disease_state": "infected",
             "time": {"dist_type": "constant", "constant": 4.0},
             "transitions": [{"to": "recovered", "probability": 0.9, "immunization_gain": 1.0},
                             {"to": "dead", "probability": 0.1}]}
        ],
        "mobility_groups": [
            {"name": "walkers", "speed": {"dist_type": "constant", "constant": 1.0}}
        ]
    });
    if let (Some(base), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
        for (key, entry) in extra {
            base.insert(key.clone(), entry.clone());
        }
    }
    serde_json::from_value(value).unwrap()
}

fn grid_frame(n: usize, infected: usize) -> AgentFrame {
    let side = (n as f64).sqrt().ceil() as usize;
    let x: Vec<f64> = (0..n).map(|i| 2.0 + 3.0 * (i % side) as f64).collect();
    let y: Vec<f64> = (0..n).map(|i| 2.0 + 3.0 * (i / side) as f64).collect();
    let states: Vec<&str> = (0..n)
        .map(|i| if i < infected { "infected" } else { "susceptible" })
        .collect();
    AgentFrame::new()
        .with_column("agent", (0..n as i64).collect::<Vec<_>>())
        .with_column("x", x)
        .with_column("y", y)
        .with_column("vx", vec![0.0; n])
        .with_column("vy", vec![0.0; n])
        .with_column("disease_state", states)
}

fn run(parameters: Parameters, frame: &AgentFrame) -> Context {
    let mut context = Context::new();
    context.init_simulation(parameters).unwrap();
    context.load_population(frame).unwrap();
    context.randomize_velocities().unwrap();
    context.run_simulation().unwrap();
    context
}

#[test]
fn same_seed_same_run() {
    let frame = grid_frame(64, 4);
    let first = run(parameters(json!({})), &frame);
    let second = run(parameters(json!({})), &frame);

    let a = first.get_population().unwrap();
    let b = second.get_population().unwrap();
    assert_eq!(a.x, b.x);
    assert_eq!(a.y, b.y);
    assert_eq!(a.disease_state, b.disease_state);
    assert_eq!(first.get_step_summaries(), second.get_step_summaries());
    assert_eq!(first.get_step_summaries().len(), 20);
    for (step, summary) in first.get_step_summaries().iter().enumerate() {
        assert_approx_eq!(summary.time, step as f64);
    }
    assert_approx_eq!(first.get_current_time(), 19.0);
}

#[test]
fn agents_stay_in_the_box_and_dead_stay_dead() {
    let frame = grid_frame(100, 10);
    let context = run(parameters(json!({})), &frame);
    let population = context.get_population().unwrap();
    for row in 0..population.len() {
        assert!((0.0..=50.0).contains(&population.x[row]));
        assert!((0.0..=50.0).contains(&population.y[row]));
        if population.is_dead[row] {
            assert_eq!((population.vx[row], population.vy[row]), (0.0, 0.0));
        }
    }
    let infections: usize = context
        .get_step_summaries()
        .iter()
        .map(|summary| summary.disease.new_infections)
        .sum();
    let times_infected: u32 = population.times_infected.iter().sum();
    assert_eq!(infections, times_infected as usize);
}

#[test]
fn hospital_overflow_kills() {
    let parameters = parameters(json!({
        "disease_groups": [
            {"name": "susceptible", "can_get_infected": true},
            {"name": "infected", "is_infected": true,
             "hospitalization_probability": {"dist_type": "constant", "constant": 1.0}},
            {"name": "dead", "is_dead": true}
        ],
        "transitions": []
    }));
    let frame = grid_frame(5, 5);
    let mut context = Context::new();
    context.init_simulation(parameters).unwrap();
    context.load_population(&frame).unwrap();

    let summary = context.step().unwrap();
    assert_eq!(summary.disease.admitted_hospital, 2);
    assert_eq!(summary.disease.overflow_deaths, 3);
    assert_eq!(context.get_healthcare_capacity().hospital_beds(), 0);

    let exported = context.export_population().unwrap();
    assert_eq!(
        exported.get("is_hospitalized"),
        Some(&Column::from(vec![true, true, false, false, false]))
    );
    assert_eq!(
        exported.get("disease_state"),
        Some(&Column::from(vec![
            "infected", "infected", "dead", "dead", "dead"
        ]))
    );
}

#[test]
fn parameters_from_a_file_and_restriction_log_to_csv() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let value = json!({
        "seed": 3,
        "dt": 0.5,
        "max_time": 5.0,
        "box": {"left": 0.0, "right": 20.0, "bottom": 0.0, "top": 20.0},
        "infection_state": "infected",
        "disease_groups": [
            {"name": "susceptible", "can_get_infected": true},
            {"name": "infected", "is_infected": true, "can_spread": true,
             "spread_radius": 2.0, "spread_probability": 1.0}
        ],
        "mobility_groups": [
            {"name": "walkers", "speed": {"dist_type": "constant", "constant": 0.5}}
        ],
        "restriction_adherence_groups": [
            {"name": "nobody", "adherence_probability": {"dist_type": "constant", "constant": 0.0}}
        ],
        "tracing_policies": [
            {"name": "lockdown", "counter": "infected", "start_level": 1.0, "stop_after": 2.0}
        ],
        "logging": {"level": "warn"}
    });
    write!(file, "{value}").unwrap();

    let parameters: Parameters = load_parameters_from_json(file.path()).unwrap();
    let context = run(parameters, &grid_frame(9, 1));
    let log = context.get_restriction_log().unwrap();
    assert_eq!(log.rows().len(), 10);
    assert_eq!(log.rows()[0].status, RestrictionStatus::Enabled);
    assert_eq!(log.rows().last().unwrap().status, RestrictionStatus::Disabled);

    let output = tempfile::NamedTempFile::new().unwrap();
    log.write_csv(output.path()).unwrap();
    let written = std::fs::read_to_string(output.path()).unwrap();
    assert!(written.starts_with("step,time,policy,status,value\n0,0.0,lockdown,enabled,"));
}

#[test]
fn missing_columns_are_reported_together() {
    let mut context = Context::new();
    context.init_simulation(parameters(json!({}))).unwrap();
    let mut frame = grid_frame(3, 1);
    frame.remove("vx");
    frame.remove("disease_state");
    match context.load_population(&frame) {
        Err(EpiError::MissingFieldError(fields)) => {
            assert_eq!(fields, vec!["vx", "disease_state"]);
        }
        other => panic!("unexpected result {other:?}"),
    }
}
