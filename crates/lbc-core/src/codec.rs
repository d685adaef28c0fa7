use crate::error::{Error, Result};
use crate::ops::{validate_volume, Operation};
use crate::reagent::Reagent;
use crate::trace::{Trace, TracedWell};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct TracePayload {
    well_count: usize,
    wells: Vec<WellPayload>,
}

#[derive(Debug, Deserialize)]
struct WellPayload {
    index: usize,
    #[serde(default)]
    ops: Vec<OpPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum OpPayload {
    Fill { volume: f64, reagent: String },
    Mix,
    Image,
}

pub fn encode_op(op: &Operation) -> Value {
    match op {
        Operation::Fill { volume, reagent } => json!({
            "kind": "fill",
            "volume": volume,
            "reagent": reagent.name(),
        }),
        Operation::Mix => json!({ "kind": "mix" }),
        Operation::Image => json!({ "kind": "image" }),
    }
}

/// `{"well_count": n, "wells": [{"index": i, "ops": [...]}, ...]}` with wells
/// in index order and ops in call order.
pub fn encode(trace: &Trace) -> Value {
    let wells: Vec<Value> = trace
        .wells()
        .iter()
        .map(|well| {
            json!({
                "index": well.index(),
                "ops": well.ops().iter().map(encode_op).collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({
        "well_count": trace.well_count(),
        "wells": wells,
    })
}

/// Request body for `POST /submissions`.
pub fn encode_submission(challenge_id: &str, trace: &Trace) -> Value {
    let mut body = encode(trace);
    if let Value::Object(map) = &mut body {
        map.insert("challenge_id".to_string(), Value::from(challenge_id));
    }
    body
}

pub fn decode(payload: &Value) -> Result<Trace> {
    let mut parsed = TracePayload::deserialize(payload)
        .map_err(|e| Error::format(format!("invalid trace payload: {}", e)))?;
    if parsed.well_count != parsed.wells.len() {
        return Err(Error::format(format!(
            "well_count is {} but payload lists {} wells",
            parsed.well_count,
            parsed.wells.len()
        )));
    }
    parsed.wells.sort_by_key(|w| w.index);

    let mut wells = Vec::with_capacity(parsed.wells.len());
    for (position, well) in parsed.wells.into_iter().enumerate() {
        if well.index != position {
            return Err(Error::format(format!(
                "well indices must be unique and contiguous from 0: expected {}, found {}",
                position, well.index
            )));
        }
        let ops = well
            .ops
            .into_iter()
            .map(|op| decode_op(well.index, op))
            .collect::<Result<Vec<_>>>()?;
        wells.push(TracedWell::new(well.index, ops));
    }
    Trace::new(wells).map_err(|e| Error::format(e.to_string()))
}

fn decode_op(index: usize, op: OpPayload) -> Result<Operation> {
    match op {
        OpPayload::Fill { volume, reagent } => {
            validate_volume(volume)
                .map_err(|e| Error::format(format!("well {}: {}", index, e)))?;
            let reagent = Reagent::new(reagent)
                .map_err(|e| Error::format(format!("well {}: {}", index, e)))?;
            Ok(Operation::Fill { volume, reagent })
        }
        OpPayload::Mix => Ok(Operation::Mix),
        OpPayload::Image => Ok(Operation::Image),
    }
}
