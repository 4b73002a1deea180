// SPDX-License-Identifier: MIT

//! Flow compilation
//!
//! Validates a flow's structure and derives the route edges the resolver
//! reads at runtime:
//! - `"0" -> start` with connecting object `"0"`
//! - one edge per connecting object, carrying the target's referenced flow
//! - `end -> "-1"` for every end event

use super::types::{App, Flow, FlowObject, FlowObjectKind};
use crate::base::error::DefinitionError;
use crate::base::instance::FlowMetadata;
use crate::base::route::{RouteEdge, END_STEP, START_STEP, SYNTHETIC_CONNECTION};
use crate::flow::condition;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFlow {
    pub metadata: FlowMetadata,
    pub start_id: String,
    pub edges: Vec<RouteEdge>,
}

impl CompiledFlow {
    /// Compile every flow of an app. Flow object ids must be unique across
    /// the app because steps are addressed per app.
    pub fn compile_app(app: &App) -> Result<Vec<CompiledFlow>, DefinitionError> {
        let mut seen = HashSet::new();
        for flow in &app.flows {
            for fo in &flow.flow_objects {
                if !seen.insert(fo.id()) {
                    return Err(DefinitionError::DuplicateFlowObject(fo.id().to_string()));
                }
            }
        }

        app.flows.iter().map(|flow| Self::compile(app, flow)).collect()
    }

    pub fn compile(app: &App, flow: &Flow) -> Result<CompiledFlow, DefinitionError> {
        let flow_id = flow.id();
        let start = single_start(flow)?;
        let ends: Vec<&FlowObject> = flow
            .flow_objects
            .iter()
            .filter(|fo| fo.kind == FlowObjectKind::EndEvent)
            .collect();
        if ends.is_empty() {
            return Err(DefinitionError::MissingEndEvent(flow_id.to_string()));
        }

        for fo in &flow.flow_objects {
            validate_flow_object(app, flow, fo)?;
        }

        let mut edges = vec![RouteEdge::new(
            flow_id,
            START_STEP,
            start.id(),
            SYNTHETIC_CONNECTION,
        )];

        for co in &flow.connecting_objects {
            if flow.flow_object(&co.from).is_none() {
                return Err(DefinitionError::UnknownFlowObject {
                    connecting_object_id: co.asset.id.clone(),
                    flow_object_id: co.from.clone(),
                });
            }
            let target = flow.flow_object(&co.to).ok_or_else(|| {
                DefinitionError::UnknownFlowObject {
                    connecting_object_id: co.asset.id.clone(),
                    flow_object_id: co.to.clone(),
                }
            })?;
            edges.push(
                RouteEdge::new(flow_id, &co.from, &co.to, &co.asset.id)
                    .with_sub_flow(target.referenced_flow_id()),
            );
        }

        for end in ends {
            edges.push(RouteEdge::new(
                flow_id,
                end.id(),
                END_STEP,
                SYNTHETIC_CONNECTION,
            ));
        }

        Ok(CompiledFlow {
            metadata: flow.metadata(app.id()),
            start_id: start.id().to_string(),
            edges,
        })
    }
}

fn single_start(flow: &Flow) -> Result<&FlowObject, DefinitionError> {
    let mut starts = flow
        .flow_objects
        .iter()
        .filter(|fo| fo.kind == FlowObjectKind::StartEvent);
    let start = starts
        .next()
        .ok_or_else(|| DefinitionError::MissingStartEvent(flow.id().to_string()))?;
    if starts.next().is_some() {
        return Err(DefinitionError::MultipleStartEvents(flow.id().to_string()));
    }
    Ok(start)
}

fn validate_flow_object(app: &App, flow: &Flow, fo: &FlowObject) -> Result<(), DefinitionError> {
    match &fo.kind {
        FlowObjectKind::DecisionGateway { conditions } => {
            if conditions.is_empty() {
                return Err(DefinitionError::EmptyGateway(fo.id().to_string()));
            }
            for (i, cond) in conditions.iter().enumerate() {
                let outgoing = flow
                    .connecting_objects
                    .iter()
                    .any(|co| co.asset.id == cond.connect_to && co.from == fo.id());
                if !outgoing {
                    return Err(DefinitionError::InvalidCondition {
                        gateway_id: fo.id().to_string(),
                        when: cond.when.clone().unwrap_or_default(),
                        reason: format!(
                            "'{}' is not an outgoing connection of the gateway",
                            cond.connect_to
                        ),
                    });
                }

                // The last condition is the fallback, a lone one is unconditional
                let is_fallback = conditions.len() == 1 || i == conditions.len() - 1;
                if is_fallback {
                    continue;
                }
                let when = cond.when.as_deref().unwrap_or_default();
                condition::parse(when).map_err(|e| DefinitionError::InvalidCondition {
                    gateway_id: fo.id().to_string(),
                    when: when.to_string(),
                    reason: e.to_string(),
                })?;
            }
            Ok(())
        }
        FlowObjectKind::SubFlowRef {
            sub_flow_id,
            address: None,
        } if app.flow(sub_flow_id).is_none() => Err(DefinitionError::UnknownSubFlow {
            flow_object_id: fo.id().to_string(),
            sub_flow_id: sub_flow_id.clone(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::definition::loader::AppLoader;

    const APP: &str = r#"
id: loans
flows:
  - id: P1
    flow_objects:
      - { id: s, kind: StartEvent }
      - { id: a, kind: SubFlowRef, sub_flow_id: S }
      - id: g
        kind: DecisionGateway
        conditions:
          - { id: big, when: "x > 5", connect_to: g_b }
          - { id: else, connect_to: g_c }
      - { id: b, kind: ViewRef, ref_view_id: form }
      - { id: c, kind: InlineAction }
      - { id: e, kind: EndEvent }
    connecting_objects:
      - { id: s_a, from: s, to: a }
      - { id: a_g, from: a, to: g }
      - { id: g_b, from: g, to: b }
      - { id: g_c, from: g, to: c }
      - { id: b_e, from: b, to: e }
      - { id: c_e, from: c, to: e }
  - id: S
    flow_type: MicroService
    flow_objects:
      - { id: s2, kind: StartEvent }
      - { id: e2, kind: EndEvent }
    connecting_objects:
      - { id: s2_e2, from: s2, to: e2 }
"#;

    fn app() -> App {
        AppLoader::parse_yaml(APP).unwrap()
    }

    #[test]
    fn test_compile_edges() {
        let app = app();
        let compiled = CompiledFlow::compile(&app, app.flow("P1").unwrap()).unwrap();

        assert_eq!(compiled.start_id, "s");
        assert_eq!(compiled.metadata.app_id, "loans");
        assert_eq!(compiled.edges.len(), 8);
        assert_eq!(compiled.edges[0], RouteEdge::new("P1", "0", "s", "0"));
        assert_eq!(
            compiled.edges[1],
            RouteEdge::new("P1", "s", "a", "s_a").with_sub_flow(Some("S".into()))
        );
        assert_eq!(
            compiled.edges[3],
            RouteEdge::new("P1", "g", "b", "g_b").with_sub_flow(Some("form".into()))
        );
        assert_eq!(
            compiled.edges.last().unwrap(),
            &RouteEdge::new("P1", "e", "-1", "0")
        );
    }

    #[test]
    fn test_compile_app() {
        let compiled = CompiledFlow::compile_app(&app()).unwrap();
        assert_eq!(compiled.len(), 2);
        assert_eq!(compiled[1].edges.len(), 3);
    }

    #[test]
    fn test_missing_start_and_end() {
        let mut app = app();
        app.flows[1].flow_objects.retain(|fo| fo.id() != "s2");
        assert_eq!(
            CompiledFlow::compile(&app, &app.flows[1]),
            Err(DefinitionError::MissingStartEvent("S".into()))
        );

        let mut app = self::app();
        app.flows[1].flow_objects.retain(|fo| fo.id() != "e2");
        assert_eq!(
            CompiledFlow::compile(&app, &app.flows[1]),
            Err(DefinitionError::MissingEndEvent("S".into()))
        );
    }

    #[test]
    fn test_unknown_sub_flow() {
        let mut app = app();
        app.flows.retain(|f| f.id() != "S");
        let result = CompiledFlow::compile(&app, &app.flows[0]);
        assert!(matches!(result, Err(DefinitionError::UnknownSubFlow { .. })));
    }

    #[test]
    fn test_dangling_connecting_object() {
        let mut app = app();
        app.flows[0].connecting_objects[0].to = "ghost".into();
        let result = CompiledFlow::compile(&app, &app.flows[0]);
        assert_eq!(
            result,
            Err(DefinitionError::UnknownFlowObject {
                connecting_object_id: "s_a".into(),
                flow_object_id: "ghost".into(),
            })
        );
    }

    #[test]
    fn test_bad_gateway_condition() {
        let mut app = app();
        if let FlowObjectKind::DecisionGateway { conditions } = &mut app.flows[0].flow_objects[2].kind
        {
            conditions[0].when = Some("x >".into());
        }
        let result = CompiledFlow::compile(&app, &app.flows[0]);
        assert!(matches!(result, Err(DefinitionError::InvalidCondition { .. })));
    }

    #[test]
    fn test_duplicate_flow_object_ids() {
        let mut app = app();
        app.flows[1].flow_objects[0].asset.id = "s".into();
        assert_eq!(
            CompiledFlow::compile_app(&app),
            Err(DefinitionError::DuplicateFlowObject("s".into()))
        );
    }
}
