//! Round semantics of the engine: conservation, division, structural
//! ordering and topology reuse.

use approx::assert_relative_eq;
use phage_core::{
    Composite, Delta, DividerRegistry, DividerTag, Engine, EngineError, LeafSpec, Path, PortView,
    PortsSchema, Process, Schema, StepError, Structural, Topology, UpdaterTag, Value,
};
use proptest::prelude::*;
use std::sync::Arc;

/// Contributes a fixed amount to `quantity` each round.
#[derive(Debug)]
struct Contribute {
    name: String,
    amount: f64,
}

impl Process for Contribute {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports_schema(&self) -> PortsSchema {
        PortsSchema::from([(
            "quantity".to_string(),
            Schema::leaf(LeafSpec::default_value(0.0).emit()),
        )])
    }

    fn next_update(&self, _timestep: f64, _view: &PortView) -> Result<Delta, StepError> {
        if self.amount == 0.0 {
            return Ok(Delta::new());
        }
        Ok(Delta::new().value("quantity", self.amount))
    }
}

/// Exponential growth of `metabolites` driven by `biomass`.
#[derive(Debug)]
struct Grow {
    rate: f64,
}

impl Process for Grow {
    fn name(&self) -> &str {
        "grow"
    }

    fn ports_schema(&self) -> PortsSchema {
        PortsSchema::from([
            ("biomass".to_string(), Schema::untyped()),
            (
                "metabolites".to_string(),
                Schema::leaf(LeafSpec::default_value(1.0).divider(DividerTag::Split)),
            ),
        ])
    }

    fn next_update(&self, timestep: f64, view: &PortView) -> Result<Delta, StepError> {
        let biomass = view.number("biomass")?;
        let metabolites = view.number("metabolites")?;
        let total = biomass * (self.rate * timestep).exp();
        Ok(Delta::new().value("metabolites", total - metabolites))
    }
}

/// Divides its agent once `variable` reaches the threshold.
#[derive(Debug)]
struct DivideAt {
    threshold: f64,
}

impl Process for DivideAt {
    fn name(&self) -> &str {
        "divide_at"
    }

    fn ports_schema(&self) -> PortsSchema {
        PortsSchema::from([
            (
                "variable".to_string(),
                Schema::leaf(LeafSpec::default_value(0.0).divider(DividerTag::Split)),
            ),
            ("agent".to_string(), Schema::branch()),
        ])
    }

    fn next_update(&self, _timestep: f64, view: &PortView) -> Result<Delta, StepError> {
        if view.number("variable")? >= self.threshold {
            return Ok(Delta::new().op("agent", Structural::divide_self()));
        }
        Ok(Delta::new())
    }
}

/// Adds a `marker` child under `genes` every round.
#[derive(Debug)]
struct AddMarker;

impl Process for AddMarker {
    fn name(&self) -> &str {
        "add_marker"
    }

    fn ports_schema(&self) -> PortsSchema {
        PortsSchema::from([("genes".to_string(), Schema::wildcard(Schema::untyped()))])
    }

    fn next_update(&self, _timestep: f64, view: &PortView) -> Result<Delta, StepError> {
        if view.record("genes")?.contains_key("marker") {
            return Ok(Delta::new());
        }
        Ok(Delta::new().op(
            "genes",
            Structural::add("marker", Value::from_pairs([("copy_number", 1.0)])),
        ))
    }
}

/// Grafts a `helper` composite and new collection entries into the cell
/// named by `attach`.
#[derive(Debug)]
struct Attach;

impl Process for Attach {
    fn name(&self) -> &str {
        "attach"
    }

    fn ports_schema(&self) -> PortsSchema {
        PortsSchema::from([
            (
                "attach".to_string(),
                Schema::leaf(LeafSpec::default_value(false).updater(UpdaterTag::Set).emit()),
            ),
            (
                "cells".to_string(),
                Schema::wildcard(Schema::branch_of([
                    ("genes", Schema::branch()),
                    ("proteins", Schema::branch()),
                ])),
            ),
        ])
    }

    fn next_update(&self, _timestep: f64, view: &PortView) -> Result<Delta, StepError> {
        let Some(cell) = view.value("attach")?.as_str() else {
            return Ok(Delta::new());
        };
        if !view.record("cells")?.contains_key(cell) {
            return Err(StepError::on_port("attach", format!("no cell {cell}")));
        }
        let helper = Composite::from_process(Arc::new(Contribute {
            name: "helper".into(),
            amount: 0.0,
        }));
        Ok(Delta::new()
            .value("attach", false)
            .op_at(
                "cells",
                &[cell, "genes"],
                Structural::add("phage", Value::from_pairs([("length", 20.0)])),
            )
            .op_at(
                "cells",
                &[cell, "proteins"],
                Structural::add("phage", Value::from_pairs([("count", 0.0)])),
            )
            .op_at("cells", &[cell], Structural::generate(None, helper)))
    }
}

fn contributors(amounts: &[f64]) -> Composite {
    let mut composite = Composite::new();
    for (i, amount) in amounts.iter().enumerate() {
        composite
            .merge(Composite::from_process(Arc::new(Contribute {
                name: format!("p{i}"),
                amount: *amount,
            })))
            .unwrap();
    }
    composite
}

fn cell(key: &str, biomass: f64, threshold: f64) -> Composite {
    Composite::new()
        .with_process(
            "divide_at",
            Arc::new(DivideAt { threshold }),
            Topology::new()
                .with("variable", &["biomass"])
                .with("agent", &[] as &[&str]),
        )
        .unwrap()
        .with_state(Value::from_pairs([("biomass", biomass)]))
        .nest(&Path::from(["cells", key]))
}

proptest! {
    #[test]
    fn prop_accumulate_conserves(
        initial in -100.0f64..100.0,
        amounts in prop::collection::vec(-10.0f64..10.0, 1..6),
    ) {
        let mut engine = Engine::builder(contributors(&amounts))
            .state(Value::from_pairs([("quantity", initial)]))
            .build()
            .unwrap();
        engine.run_round(1.0).unwrap();

        let after = engine.read(&Path::from("quantity")).and_then(|v| v.as_f64()).unwrap();
        let expected = initial + amounts.iter().sum::<f64>();
        prop_assert!((after - expected).abs() < 1e-9);

        let mut reversed_amounts = amounts.clone();
        reversed_amounts.reverse();
        let mut reversed = Engine::builder(contributors(&reversed_amounts))
            .state(Value::from_pairs([("quantity", initial)]))
            .build()
            .unwrap();
        reversed.run_round(1.0).unwrap();
        let other = reversed.read(&Path::from("quantity")).and_then(|v| v.as_f64()).unwrap();
        prop_assert!((after - other).abs() < 1e-9);
    }

    #[test]
    fn prop_split_sums_to_whole(v in -1.0e6f64..1.0e6) {
        let registry = DividerRegistry::default();
        let (a, b) = registry
            .divide(Some(&DividerTag::Split), &Path::from("biomass"), &Value::from(v))
            .unwrap();
        let sum = a.as_f64().unwrap() + b.as_f64().unwrap();
        prop_assert!((sum - v).abs() <= 1e-9 * v.abs().max(1.0));
    }

    #[test]
    fn prop_empty_delta_changes_nothing(initial in -50.0f64..50.0, rounds in 1u32..5) {
        let mut engine = Engine::builder(contributors(&[0.0, 0.0]))
            .state(Value::from_pairs([("quantity", initial)]))
            .build()
            .unwrap();
        let before = engine.state().clone();
        for _ in 0..rounds {
            engine.run_round(0.5).unwrap();
        }
        prop_assert_eq!(engine.state(), &before);
    }
}

#[test]
fn test_growth_scenario() {
    let composite = Composite::new()
        .with_process(
            "grow",
            Arc::new(Grow { rate: 5e-4 }),
            Topology::new()
                .with("biomass", &["quantity"])
                .with("metabolites", &["quantity"]),
        )
        .unwrap()
        .with_state(Value::from_pairs([("quantity", 1.0)]));
    let mut engine = Engine::new(composite).unwrap();

    engine.run_round(10.0).unwrap();

    let quantity = engine.read(&Path::from("quantity")).and_then(|v| v.as_f64()).unwrap();
    assert_relative_eq!(quantity, (5e-4f64 * 10.0).exp(), epsilon = 1e-12);
    assert_relative_eq!(quantity, 1.0050125, epsilon = 1e-6);
}

#[test]
fn test_division_scenario() {
    let mut engine = Engine::new(cell("agent_0", 2.0, 2.0)).unwrap();
    let report = engine.run_round(1.0).unwrap();

    assert_eq!(report.divided, 1);
    assert!(engine.read(&Path::from("cells/agent_0")).is_none());
    for daughter in ["cells/agent_0_0", "cells/agent_0_1"] {
        let biomass = engine
            .read(&Path::from(daughter).child("biomass"))
            .and_then(|v| v.as_f64())
            .unwrap();
        assert_relative_eq!(biomass, 1.0);
    }
    assert_eq!(
        engine.process_ids(),
        vec!["cells/agent_0_0/divide_at", "cells/agent_0_1/divide_at"]
    );

    // Daughters are below threshold and stay put.
    engine.run_round(1.0).unwrap();
    assert_eq!(engine.state().child_keys(&Path::from("cells")).len(), 2);
}

#[test]
fn test_daughter_keys_skip_taken_names() {
    let mut composite = cell("agent_0", 4.0, 2.0);
    composite
        .merge(cell("agent_0_0", 1.0, 2.0))
        .unwrap();
    let mut engine = Engine::new(composite).unwrap();
    engine.run_round(1.0).unwrap();

    assert_eq!(
        engine.state().child_keys(&Path::from("cells")),
        vec!["agent_0_0", "agent_0_1", "agent_0_2"]
    );
}

#[test]
fn test_add_lands_before_divide() {
    let composite = Composite::new()
        .with_process(
            "divide_at",
            Arc::new(DivideAt { threshold: 1.0 }),
            Topology::new()
                .with("variable", &["biomass"])
                .with("agent", &[] as &[&str]),
        )
        .unwrap()
        .with_process(
            "add_marker",
            Arc::new(AddMarker),
            Topology::new().with("genes", &["genes"]),
        )
        .unwrap()
        .with_state(Value::from_pairs([("biomass", 2.0)]))
        .nest(&Path::from("cells/c"));
    let mut engine = Engine::new(composite).unwrap();
    engine.run_round(1.0).unwrap();

    for daughter in ["cells/c_0", "cells/c_1"] {
        let marker = Path::from(daughter).join(&Path::from("genes/marker/copy_number"));
        assert_eq!(engine.read(&marker), Some(Value::from(1.0)));
    }
}

#[test]
fn test_topology_reuse_is_independent() {
    let process: Arc<dyn Process> = Arc::new(Contribute {
        name: "count".into(),
        amount: 1.0,
    });
    let topology = Topology::new().with("quantity", &["quantity"]);
    let composite = Composite::new()
        .with_process("agents/a/count", Arc::clone(&process), topology.clone())
        .unwrap()
        .with_process("agents/b/count", process, topology)
        .unwrap()
        .with_state(Value::from_pairs([(
            "agents",
            Value::from_pairs([("b", Value::from_pairs([("quantity", 10.0)]))]),
        )]));
    let mut engine = Engine::new(composite).unwrap();
    engine.advance(3.0).unwrap();

    assert_eq!(engine.read(&Path::from("agents/a/quantity")), Some(Value::from(3.0)));
    assert_eq!(engine.read(&Path::from("agents/b/quantity")), Some(Value::from(13.0)));
}

#[test]
fn test_structural_insertion_scenario() {
    let mut composite = Composite::new()
        .with_process(
            "phages/phage_0/attach",
            Arc::new(Attach),
            Topology::new()
                .with("attach", &["attach"])
                .with("cells", &["..", "..", "cells"]),
        )
        .unwrap();
    composite
        .merge(cell("cell_0", 1.0, 100.0))
        .unwrap();
    let mut engine = Engine::new(composite).unwrap();

    engine.run_round(1.0).unwrap();
    assert!(engine.read(&Path::from("cells/cell_0/genes/phage")).is_none());

    engine
        .write(&Path::from("phages/phage_0/attach"), Value::from("cell_0"))
        .unwrap();
    let report = engine.run_round(1.0).unwrap();
    assert_eq!(report.added, 2);
    assert_eq!(report.generated, 1);

    assert_eq!(
        engine.read(&Path::from("cells/cell_0/genes/phage/length")),
        Some(Value::from(20.0))
    );
    assert_eq!(
        engine.read(&Path::from("cells/cell_0/proteins/phage/count")),
        Some(Value::from(0.0))
    );
    assert_eq!(
        engine.read(&Path::from("phages/phage_0/attach")),
        Some(Value::from(false))
    );
    assert!(engine
        .process_ids()
        .contains(&"cells/cell_0/helper".to_string()));
    // Generated composite's defaults were ensured.
    assert_eq!(
        engine.read(&Path::from("cells/cell_0/quantity")),
        Some(Value::from(0.0))
    );
}

#[test]
fn test_attach_to_unknown_cell_fails() {
    let composite = Composite::new()
        .with_process(
            "phages/phage_0/attach",
            Arc::new(Attach),
            Topology::new()
                .with("attach", &["attach"])
                .with("cells", &["..", "..", "cells"]),
        )
        .unwrap();
    let mut engine = Engine::new(composite).unwrap();
    engine
        .write(&Path::from("phages/phage_0/attach"), Value::from("cell_9"))
        .unwrap();

    let err = engine.run_round(1.0).unwrap_err();
    assert!(matches!(err, EngineError::ProcessStep { ref process, .. } if process == "phages/phage_0/attach"));
}

#[test]
fn test_second_attach_to_same_cell_fails() {
    let mut composite = Composite::new()
        .with_process(
            "phages/phage_0/attach",
            Arc::new(Attach),
            Topology::new()
                .with("attach", &["attach"])
                .with("cells", &["..", "..", "cells"]),
        )
        .unwrap();
    composite.merge(cell("cell_0", 1.0, 100.0)).unwrap();
    let mut engine = Engine::new(composite).unwrap();

    let attach = Path::from("phages/phage_0/attach");
    engine.write(&attach, Value::from("cell_0")).unwrap();
    engine.run_round(1.0).unwrap();
    engine.write(&attach, Value::from("cell_0")).unwrap();

    let err = engine.run_round(1.0).unwrap_err();
    assert!(matches!(err, EngineError::StructuralTarget { .. }));
}

#[test]
fn test_missing_port_reported() {
    let composite = Composite::new()
        .with_process(
            "grow",
            Arc::new(Grow { rate: 1e-3 }),
            Topology::new()
                .with("biomass", &["mass"])
                .with("metabolites", &["metabolites"]),
        )
        .unwrap();
    let mut engine = Engine::new(composite).unwrap();
    let err = engine.run_round(1.0).unwrap_err();
    assert_eq!(
        err,
        EngineError::MissingPort {
            process: "grow".into(),
            port: "biomass".into(),
            path: "mass".into(),
        }
    );
}

#[test]
fn test_unresolved_port_reported_at_build() {
    let composite = Composite::new()
        .with_process(
            "grow",
            Arc::new(Grow { rate: 1e-3 }),
            Topology::new().with("biomass", &["biomass"]),
        )
        .unwrap();
    let err = Engine::new(composite).unwrap_err();
    assert!(matches!(err, EngineError::UnresolvedPort { ref port, .. } if port == "metabolites"));
}

#[test]
fn test_generate_into_occupied_name_collides() {
    let mut engine = Engine::new(cell("c", 1.0, 10.0)).unwrap();
    let err = engine
        .add_composite(&Path::from("cells/c"), cell_processes(10.0))
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::NamingCollision {
            name: "cells/c/divide_at".into(),
        }
    );
}

#[test]
fn test_divide_and_remove_same_target() {
    #[derive(Debug)]
    struct Both;

    impl Process for Both {
        fn name(&self) -> &str {
            "both"
        }

        fn ports_schema(&self) -> PortsSchema {
            PortsSchema::from([("cells".to_string(), Schema::branch())])
        }

        fn next_update(&self, _timestep: f64, _view: &PortView) -> Result<Delta, StepError> {
            Ok(Delta::new()
                .op(
                    "cells",
                    Structural::Divide {
                        key: Some("c".into()),
                        daughters: None,
                    },
                )
                .op("cells", Structural::remove("c")))
        }
    }

    let mut composite = cell("c", 1.0, 10.0);
    composite.merge(Composite::from_process(Arc::new(Both))).unwrap();
    let mut engine = Engine::new(composite).unwrap();

    let err = engine.run_round(1.0).unwrap_err();
    assert!(matches!(err, EngineError::StructuralTarget { ref path, .. } if path == "cells/c"));
}

fn cell_processes(threshold: f64) -> Composite {
    Composite::new()
        .with_process(
            "divide_at",
            Arc::new(DivideAt { threshold }),
            Topology::new()
                .with("variable", &["biomass"])
                .with("agent", &[] as &[&str]),
        )
        .unwrap()
}
