//! Topological ordering of layers with construction-time cycle detection.
//!
//! Resolution runs before any layer's build closure, so a rejected graph
//! has no partial side effects: no service instantiated, no connection
//! opened.

use std::collections::HashMap;

use lattice_core::Fault;

use super::layer::Layer;
use super::service::ServiceId;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Returns indices into `layers` in dependency-first order.
///
/// # Errors
///
/// - [`Fault::NotFound`] naming the first token that some layer requires
///   but no layer provides.
/// - [`Fault::CyclicDependency`] naming the tokens along the cycle.
pub(crate) fn resolution_order(layers: &[Layer]) -> Result<Vec<usize>, Fault> {
    let index: HashMap<ServiceId, usize> = layers
        .iter()
        .enumerate()
        .map(|(i, layer)| (layer.descriptor().id, i))
        .collect();

    for layer in layers {
        for dependency in &layer.descriptor().requires {
            if !index.contains_key(dependency) {
                return Err(Fault::not_found(dependency.name()));
            }
        }
    }

    let mut marks = vec![Mark::Unvisited; layers.len()];
    let mut stack = Vec::new();
    let mut order = Vec::with_capacity(layers.len());

    for start in 0..layers.len() {
        visit(start, layers, &index, &mut marks, &mut stack, &mut order)?;
    }

    Ok(order)
}

fn visit(
    idx: usize,
    layers: &[Layer],
    index: &HashMap<ServiceId, usize>,
    marks: &mut [Mark],
    stack: &mut Vec<usize>,
    order: &mut Vec<usize>,
) -> Result<(), Fault> {
    match marks[idx] {
        Mark::Done => return Ok(()),
        Mark::InProgress => {
            // Tokens from the cycle's first occurrence on the stack back to
            // the repeated one, e.g. posts -> users -> posts.
            let start = stack.iter().position(|&i| i == idx).unwrap_or(0);
            let mut tokens: Vec<String> = stack[start..]
                .iter()
                .map(|&i| layers[i].descriptor().id.name().to_string())
                .collect();
            tokens.push(layers[idx].descriptor().id.name().to_string());
            return Err(Fault::CyclicDependency { tokens });
        }
        Mark::Unvisited => {}
    }

    marks[idx] = Mark::InProgress;
    stack.push(idx);

    for dependency in &layers[idx].descriptor().requires {
        // Presence was checked up front; a missing entry cannot occur here.
        if let Some(&dep_idx) = index.get(dependency) {
            visit(dep_idx, layers, index, marks, stack, order)?;
        }
    }

    stack.pop();
    marks[idx] = Mark::Done;
    order.push(idx);
    Ok(())
}
