//! Behavioural properties of the query, resolution and dispatch pipeline
//! checked against small hand-built trees.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sondeo::prelude::*;
use sondeo::{resolve, ActionFailure, Purpose, ResolutionError};

fn desktop_with_app(name: &str) -> (Arc<InMemoryDesktop>, NodeId) {
    let d = Arc::new(InMemoryDesktop::new());
    let app = d.add_application(name);
    (d, app)
}

// ============================================================================
// Dispatch
// ============================================================================

#[test]
fn test_all_attempts_every_target_and_reports_the_failure() {
    let (d, app) = desktop_with_app("three");
    let ids: Vec<NodeId> = (0..3)
        .map(|i| {
            d.add_node(
                &app,
                NodeSpec::new(Role::PushButton)
                    .name(format!("b{i}"))
                    .action("click"),
            )
            .unwrap()
        })
        .collect();
    d.on_action(&ids[1], "click", |_| Err("widget is busy".to_string()));

    let s = Session::attach(d.clone(), app);
    let err = s
        .objects_in(by::role(Role::PushButton))
        .all()
        .perform("click")
        .unwrap_err();

    let action = err.as_action().unwrap();
    assert_eq!(action.attempted, 3);
    assert_eq!(action.failures.len(), 1);
    assert_eq!(action.failures[0].index, 1);
    assert!(matches!(
        action.failures[0].failure,
        ActionFailure::Rejected { .. }
    ));

    let received: Vec<NodeId> = d.dispatched().into_iter().map(|a| a.node).collect();
    assert_eq!(received, ids);
}

#[test]
fn test_first_on_empty_narrowed_set_dispatches_nothing() {
    let (d, app) = desktop_with_app("form");
    for name in ["orders", "customers"] {
        let table = d
            .add_node(&app, NodeSpec::new(Role::Table).name(name))
            .unwrap();
        for button in ["Submit", "Cancel"] {
            d.add_node(
                &table,
                NodeSpec::new(Role::PushButton).name(button).action("click"),
            )
            .unwrap();
        }
    }
    d.add_node(
        &app,
        NodeSpec::new(Role::PushButton).name("Nada").action("click"),
    )
    .unwrap();

    let s = Session::attach(d.clone(), app);
    let tables = s.objects_in(by::role(Role::Table));
    assert_eq!(tables.evaluate().unwrap().len(), 2);
    let buttons = tables.clone().objects_in(by::role(Role::PushButton));
    assert_eq!(buttons.evaluate().unwrap().len(), 4);

    let err = tables
        .objects_in(by::name("Nada"))
        .first()
        .perform("click")
        .unwrap_err();

    assert!(matches!(
        err.as_resolution(),
        Some(ResolutionError::Empty { .. })
    ));
    assert!(d.dispatched().is_empty());
}

#[test]
fn test_nested_tables_match_every_depth_in_order() {
    let (d, app) = desktop_with_app("nested");
    let outer = d
        .add_node(&app, NodeSpec::new(Role::Table).name("outer"))
        .unwrap();
    let top = d
        .add_node(&outer, NodeSpec::new(Role::PushButton).name("top"))
        .unwrap();
    let inner = d
        .add_node(&outer, NodeSpec::new(Role::Table).name("inner"))
        .unwrap();
    let deep = d
        .add_node(&inner, NodeSpec::new(Role::PushButton).name("deep"))
        .unwrap();
    d.add_node(&app, NodeSpec::new(Role::PushButton).name("outside"))
        .unwrap();

    let tables = sondeo::objects_in(app.clone(), by::role(Role::Table));
    let set = tables.clone().evaluate(d.as_ref()).unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set[0].id(), &outer);
    assert_eq!(set[1].id(), &inner);

    // both tables are scopes: "deep" is reached from each of them
    let buttons = tables
        .objects_in(by::role(Role::PushButton))
        .evaluate(d.as_ref())
        .unwrap();
    let ids: Vec<&NodeId> = buttons.iter().map(|h| h.id()).collect();
    assert_eq!(ids, vec![&top, &deep, &deep]);

    let direct = sondeo::objects_in(
        app,
        by::role(Role::PushButton) & by::child_of(by::name("inner")),
    )
    .evaluate(d.as_ref())
    .unwrap();
    assert_eq!(direct.len(), 1);
    assert_eq!(direct[0].id(), &deep);
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_resolution_shapes() {
    let (d, app) = desktop_with_app("pair");
    for name in ["a", "b"] {
        d.add_node(&app, NodeSpec::new(Role::Label).name(name)).unwrap();
    }
    let two = sondeo::objects_in(app.clone(), by::role(Role::Label))
        .evaluate(d.as_ref())
        .unwrap();
    let none = sondeo::objects_in(app, by::role(Role::Entry))
        .evaluate(d.as_ref())
        .unwrap();

    assert!(matches!(
        resolve(&two, Cardinality::ExactlyOne, Purpose::Action),
        Err(ResolutionError::Ambiguous { count: 2, .. })
    ));
    assert_eq!(
        resolve(&two, Cardinality::First, Purpose::Action).unwrap().len(),
        1
    );
    assert!(resolve(&none, Cardinality::All, Purpose::Assertion)
        .unwrap()
        .is_empty());
    assert!(resolve(&none, Cardinality::All, Purpose::Action).is_err());
    assert!(resolve(&none, Cardinality::First, Purpose::Assertion).is_err());
}

// ============================================================================
// Assertions
// ============================================================================

#[test]
fn test_assertion_sees_late_change() {
    let (d, app) = desktop_with_app("status");
    let label = d
        .add_node(&app, NodeSpec::new(Role::Label).name("status").text("busy"))
        .unwrap();
    let late = Arc::clone(&d);
    let h = thread::spawn(move || {
        thread::sleep(Duration::from_millis(80));
        late.set_text(&label, "done").unwrap();
    });

    let s = Session::attach(d, app);
    let report = s
        .objects_in(by::name("status"))
        .exactly_one()
        .within_ms(2000)
        .verify(by::text("done"))
        .unwrap();
    h.join().unwrap();
    assert!(report.attempts > 1);
    assert!(report.elapsed > Duration::ZERO);
}

#[test]
fn test_assertion_over_empty_all_is_vacuous() {
    let (d, app) = desktop_with_app("empty");
    let s = Session::attach(d, app);
    let report = s
        .objects_in(by::role(Role::CheckBox))
        .verify_all(by::state(State::Checked))
        .unwrap();
    assert_eq!(report.attempts, 1);
    assert!(report.observed.is_empty());
}

#[test]
fn test_assertion_resolution_error_is_not_retried() {
    let (d, app) = desktop_with_app("empty");
    let s = Session::attach(d, app);
    let started = std::time::Instant::now();
    let err = s
        .objects_in(by::role(Role::CheckBox))
        .first()
        .within_ms(3000)
        .verify(by::state(State::Checked))
        .unwrap_err();
    assert!(err.as_resolution().is_some());
    assert!(started.elapsed() < Duration::from_millis(1000));
}
