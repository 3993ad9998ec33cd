// Protocol assembly: the ref table, instruction builders, the transfer
// planner and document serialization

use crate::CONTAINER_TYPES;
use crate::container::Container;
use crate::container_type::ContainerTypeSelector;
use crate::error::{ErrorCode, ProtocolError, Result};
use crate::instruction::{
    DispenseColumn, Instruction, Mix, PipetteGroup, RefResolver, TransferRecord,
};
use crate::unit::Unit;
use crate::well::Well;
use crate::well_group::WellGroup;
use serde_json::{Map, Value};
use std::collections::HashMap;

// Largest volume a single tip can move, in microliters.
pub const TIP_CAPACITY_UL: f64 = 750.0;

const INCUBATE_LOCATIONS: [&str; 6] = [
    "ambient",
    "warm_30",
    "warm_37",
    "cold_4",
    "cold_20",
    "cold_80",
];

const LID_TYPES: [&str; 3] = ["standard", "universal", "low_evaporation"];

const TIME_UNITS: [&str; 3] = ["second", "minute", "hour"];

// Bounds float drift across repeated volume arithmetic.
fn round12(value: f64) -> f64 {
    (value * 1e12).round() / 1e12
}

// "id" names an existing container in inventory; without it the ref asks
// for a fresh one. Exactly one of storage and discard must be set.
#[derive(Clone, Debug, Default)]
pub struct RefOpts {
    pub id: Option<String>,
    pub storage: Option<String>,
    pub discard: bool,
}

#[derive(Clone, Debug)]
pub struct Ref {
    name: String,
    container: Container,
    opts: RefOpts,
}

impl Ref {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn opts(&self) -> &RefOpts {
        &self.opts
    }

    fn to_value(&self) -> Value {
        let mut fields = Map::new();
        match &self.opts.id {
            Some(id) => fields.insert("id".to_string(), Value::String(id.clone())),
            None => fields.insert(
                "new".to_string(),
                Value::String(self.container.container_type().shortname.clone()),
            ),
        };
        if self.opts.discard {
            fields.insert("discard".to_string(), Value::Bool(true));
        } else if let Some(location) = &self.opts.storage {
            let mut store = Map::new();
            store.insert("where".to_string(), Value::String(location.clone()));
            fields.insert("store".to_string(), Value::Object(store));
        }
        Value::Object(fields)
    }
}

// One volume for every destination, or one volume per destination.
#[derive(Clone, Debug)]
pub enum VolumeSpec {
    One(Unit),
    Many(Vec<Unit>),
}

impl From<Unit> for VolumeSpec {
    fn from(unit: Unit) -> Self {
        Self::One(unit)
    }
}

impl From<Vec<Unit>> for VolumeSpec {
    fn from(units: Vec<Unit>) -> Self {
        Self::Many(units)
    }
}

#[derive(Clone, Debug, Default)]
pub struct TransferOptions {
    // Treat the sources as one depletable pool instead of pairing 1:1.
    pub one_source: bool,
    // All atomic steps into a single tip group.
    pub one_tip: bool,
    // Start a fresh pipette instruction instead of extending a trailing one.
    pub new_group: bool,
    pub mix_before: bool,
    pub mix_after: bool,
    pub mix_vol: Option<Unit>,
    pub repetitions: Option<u32>,
    pub flowrate: Option<Unit>,
    pub aspirate_speed: Option<Unit>,
    pub dispense_speed: Option<Unit>,
    pub tip_type: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct Protocol {
    refs: HashMap<String, Ref>,
    instructions: Vec<Instruction>,
}

impl Protocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refs(&self) -> &HashMap<String, Ref> {
        &self.refs
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    // Registers a named container, by catalogue shortname or inline
    // ContainerType, and returns a handle to it.
    pub fn add_ref(
        &mut self,
        name: &str,
        container_type: impl Into<ContainerTypeSelector>,
        opts: RefOpts,
    ) -> Result<Container> {
        if self.refs.contains_key(name) {
            return Err(ProtocolError {
                code: ErrorCode::DuplicateName,
                message: format!("A ref named '{name}' already exists"),
            });
        }
        if opts.storage.is_some() == opts.discard {
            return Err(ProtocolError {
                code: ErrorCode::InvalidRefSpec,
                message: format!("Ref '{name}' must either be stored or discarded"),
            });
        }
        let container_type = match container_type.into() {
            ContainerTypeSelector::Shortname(shortname) => CONTAINER_TYPES
                .get(&shortname)
                .cloned()
                .ok_or_else(|| ProtocolError {
                    code: ErrorCode::InvalidArgument,
                    message: format!("Unknown container type '{shortname}'"),
                })?,
            ContainerTypeSelector::Custom(container_type) => {
                if container_type.well_count == 0
                    || container_type.col_count == 0
                    || container_type.well_count % container_type.col_count != 0
                {
                    return Err(ProtocolError {
                        code: ErrorCode::InvalidArgument,
                        message: format!(
                            "Container type '{}' has an invalid layout: {} wells in {} columns",
                            container_type.name,
                            container_type.well_count,
                            container_type.col_count
                        ),
                    });
                }
                if !container_type.well_volume_ul.is_finite()
                    || container_type.well_volume_ul <= 0.0
                {
                    return Err(ProtocolError {
                        code: ErrorCode::InvalidArgument,
                        message: format!(
                            "Container type '{}' has an invalid well capacity of {} microliters",
                            container_type.name, container_type.well_volume_ul
                        ),
                    });
                }
                container_type
            }
        };
        let container = Container::new(
            container_type,
            opts.id.clone(),
            Some(name.to_string()),
            opts.storage.clone(),
        );
        self.refs.insert(
            name.to_string(),
            Ref {
                name: name.to_string(),
                container: container.clone(),
                opts,
            },
        );
        Ok(container)
    }

    pub fn append(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    // Plans a liquid transfer and appends the resulting pipette steps. The
    // full step list is validated and simulated before any well volume or
    // the instruction list is touched; a failing call leaves the protocol
    // unchanged.
    pub fn transfer(
        &mut self,
        from: impl Into<WellGroup>,
        to: impl Into<WellGroup>,
        volume: impl Into<VolumeSpec>,
        opts: TransferOptions,
    ) -> Result<()> {
        let from = from.into();
        let to = to.into();
        if from.is_empty() || to.is_empty() {
            return Err(ProtocolError {
                code: ErrorCode::ShapeMismatch,
                message: "Transfer needs at least one source and one destination well"
                    .to_string(),
            });
        }

        let mut sources: Vec<Well> = from.iter().cloned().collect();
        let mut destinations: Vec<Well> = to.iter().cloned().collect();
        if !opts.one_source && sources.len() != destinations.len() {
            if sources.len() == 1 {
                sources = vec![sources[0].clone(); destinations.len()];
            } else if destinations.len() == 1 {
                destinations = vec![destinations[0].clone(); sources.len()];
            } else {
                return Err(ProtocolError {
                    code: ErrorCode::ShapeMismatch,
                    message: format!(
                        "Cannot transfer {} source wells to {} destination wells; \
                         specify one_source, make the destination singular, or match \
                         the counts 1:1",
                        sources.len(),
                        destinations.len()
                    ),
                });
            }
        }

        // One request per destination.
        let requested = match volume.into() {
            VolumeSpec::One(unit) => vec![unit; destinations.len()],
            VolumeSpec::Many(units) => {
                if units.len() != destinations.len() {
                    return Err(ProtocolError {
                        code: ErrorCode::VolumeCountMismatch,
                        message: format!(
                            "Got {} volumes for {} destination wells",
                            units.len(),
                            destinations.len()
                        ),
                    });
                }
                units
            }
        };
        let mut requested_ul = Vec::with_capacity(requested.len());
        for unit in &requested {
            let volume_ul = unit.to_microliters()?;
            // NaN would pass a plain <= 0.0 test.
            if !volume_ul.is_finite() || volume_ul <= 0.0 {
                return Err(ProtocolError {
                    code: ErrorCode::InvalidArgument,
                    message: format!(
                        "Transfer volumes must be finite and positive, got '{unit}'"
                    ),
                });
            }
            requested_ul.push(volume_ul);
        }

        let pairs = if opts.one_source {
            apportion_pool(&sources, &destinations, &requested_ul)?
        } else {
            sources
                .iter()
                .cloned()
                .zip(destinations.iter().cloned())
                .zip(requested_ul.iter().copied())
                .map(|((source, destination), volume_ul)| (source, destination, volume_ul))
                .collect()
        };

        // Split oversized pairs into tip-capacity chunks. A pair total the
        // destination well cannot hold at all is rejected up front, which
        // also bounds the strip-one-tip loop.
        let mut steps: Vec<(Well, Well, f64)> = Vec::new();
        for (source, destination, volume_ul) in pairs {
            let capacity = destination.container_type().well_volume_ul;
            if volume_ul > capacity {
                return Err(ProtocolError {
                    code: ErrorCode::CapacityExceeded,
                    message: format!(
                        "Cannot transfer {volume_ul} microliters into a {} well \
                         that holds at most {capacity}",
                        destination.container_type().shortname
                    ),
                });
            }
            let mut remaining = volume_ul;
            while remaining > TIP_CAPACITY_UL {
                steps.push((source.clone(), destination.clone(), TIP_CAPACITY_UL));
                remaining = round12(remaining - TIP_CAPACITY_UL);
            }
            if remaining > 0.0 {
                steps.push((source, destination, remaining));
            }
        }

        // Replay the whole step list against simulated volumes before
        // touching any well.
        let mut simulated: HashMap<(u64, usize), f64> = HashMap::new();
        for (source, destination, volume_ul) in &steps {
            let key = (destination.container_uid(), destination.index());
            let held = simulated
                .get(&key)
                .copied()
                .or_else(|| destination.volume().map(|v| v.value))
                .unwrap_or(0.0);
            let next = round12(held + volume_ul);
            let capacity = destination.container_type().well_volume_ul;
            if next > capacity {
                return Err(ProtocolError {
                    code: ErrorCode::CapacityExceeded,
                    message: format!(
                        "Transfer would raise well {} to {next} microliters, over the \
                         {capacity} microliter capacity of a {} well",
                        destination.index(),
                        destination.container_type().shortname
                    ),
                });
            }
            simulated.insert(key, next);

            let key = (source.container_uid(), source.index());
            let tracked = match simulated.get(&key) {
                Some(&held) => Some(held),
                None => source.volume().map(|v| v.value),
            };
            if let Some(held) = tracked {
                simulated.insert(key, round12(held - volume_ul));
            }
        }

        // Commit: apply the deltas and build one record per step.
        let mut records = Vec::with_capacity(steps.len());
        for (source, destination, volume_ul) in steps {
            let held = destination.volume().map(|v| v.value).unwrap_or(0.0);
            destination.set_volume(Unit::microliters(round12(held + volume_ul)))?;
            if let Some(volume) = source.volume() {
                source.set_volume(Unit::microliters(round12(volume.value - volume_ul)))?;
            }

            let (mix_before, mix_after) = if opts.mix_before || opts.mix_after {
                let mix = Mix {
                    volume: opts
                        .mix_vol
                        .clone()
                        .unwrap_or_else(|| Unit::microliters(round12(volume_ul / 2.0))),
                    repetitions: opts.repetitions.unwrap_or(10),
                    speed: opts
                        .flowrate
                        .clone()
                        .unwrap_or_else(|| Unit::new(100.0, "microliter/second")),
                };
                (
                    opts.mix_before.then(|| mix.clone()),
                    opts.mix_after.then_some(mix),
                )
            } else {
                (None, None)
            };
            records.push(TransferRecord {
                from: source,
                to: destination,
                volume: Unit::microliters(volume_ul),
                mix_before,
                mix_after,
                aspirate_speed: opts.aspirate_speed.clone(),
                dispense_speed: opts.dispense_speed.clone(),
            });
        }

        let groups = if opts.one_tip {
            vec![PipetteGroup {
                tip_type: opts.tip_type.clone(),
                transfers: records,
            }]
        } else {
            records
                .into_iter()
                .map(|record| PipetteGroup {
                    tip_type: opts.tip_type.clone(),
                    transfers: vec![record],
                })
                .collect()
        };
        self.pipette(groups, opts.new_group);
        Ok(())
    }

    // Coalesces into a trailing pipette instruction unless a fresh one was
    // asked for.
    fn pipette(&mut self, groups: Vec<PipetteGroup>, new_group: bool) {
        if !new_group {
            if let Some(Instruction::Pipette { groups: trailing }) = self.instructions.last_mut()
            {
                trailing.extend(groups);
                return;
            }
        }
        self.instructions.push(Instruction::Pipette { groups });
    }

    pub fn incubate(
        &mut self,
        object: &Container,
        location: &str,
        duration: Unit,
        shaking: bool,
    ) -> Result<()> {
        if !INCUBATE_LOCATIONS.contains(&location) {
            return Err(ProtocolError {
                code: ErrorCode::InvalidArgument,
                message: format!(
                    "'{location}' is not an incubation location ({})",
                    INCUBATE_LOCATIONS.join(", ")
                ),
            });
        }
        if !TIME_UNITS.contains(&duration.unit.as_str()) {
            return Err(ProtocolError {
                code: ErrorCode::UnitMismatch,
                message: format!("Incubation takes a time, got '{duration}'"),
            });
        }
        self.instructions.push(Instruction::Incubate {
            object: object.clone(),
            location: location.to_string(),
            duration,
            shaking,
        });
        Ok(())
    }

    pub fn dispense(
        &mut self,
        object: &Container,
        reagent: &str,
        columns: &[(usize, Unit)],
    ) -> Result<()> {
        if !object.container_type().has_capability("dispense") {
            return Err(ProtocolError {
                code: ErrorCode::Unsupported,
                message: format!(
                    "A {} cannot take a reagent dispense",
                    object.container_type().shortname
                ),
            });
        }
        let mut resolved = Vec::with_capacity(columns.len());
        for (column, volume) in columns {
            if *column >= object.col_count() {
                return Err(ProtocolError {
                    code: ErrorCode::OutOfRange,
                    message: format!(
                        "Column {column} is out of range for a {} column plate",
                        object.col_count()
                    ),
                });
            }
            let volume_ul = volume.to_microliters()?;
            if volume_ul <= 0.0 {
                return Err(ProtocolError {
                    code: ErrorCode::InvalidArgument,
                    message: format!("Dispense volumes must be positive, got '{volume}'"),
                });
            }
            resolved.push(DispenseColumn {
                column: *column,
                volume: Unit::microliters(volume_ul),
            });
        }
        self.instructions.push(Instruction::Dispense {
            object: object.clone(),
            reagent: reagent.to_string(),
            columns: resolved,
        });
        Ok(())
    }

    pub fn cover(&mut self, object: &Container, lid: &str) -> Result<()> {
        if !LID_TYPES.contains(&lid) {
            return Err(ProtocolError {
                code: ErrorCode::InvalidArgument,
                message: format!("'{lid}' is not a lid type ({})", LID_TYPES.join(", ")),
            });
        }
        if !object.container_type().has_capability("cover") {
            return Err(ProtocolError {
                code: ErrorCode::Unsupported,
                message: format!("A {} cannot be covered", object.container_type().shortname),
            });
        }
        self.instructions.push(Instruction::Cover {
            object: object.clone(),
            lid: lid.to_string(),
        });
        Ok(())
    }

    pub fn uncover(&mut self, object: &Container) -> Result<()> {
        if !object.container_type().has_capability("cover") {
            return Err(ProtocolError {
                code: ErrorCode::Unsupported,
                message: format!("A {} cannot be covered", object.container_type().shortname),
            });
        }
        self.instructions.push(Instruction::Uncover {
            object: object.clone(),
        });
        Ok(())
    }

    pub fn luminescence(
        &mut self,
        object: &Container,
        wells: impl Into<WellGroup>,
        dataref: &str,
    ) -> Result<()> {
        if !object.container_type().has_capability("luminescence") {
            return Err(ProtocolError {
                code: ErrorCode::Unsupported,
                message: format!(
                    "A {} cannot be read for luminescence",
                    object.container_type().shortname
                ),
            });
        }
        let wells = wells.into();
        for well in &wells {
            if well.container_uid() != object.uid() {
                return Err(ProtocolError {
                    code: ErrorCode::InvalidArgument,
                    message: format!(
                        "Well {} does not belong to the container being read",
                        well.index()
                    ),
                });
            }
        }
        self.instructions.push(Instruction::Luminescence {
            object: object.clone(),
            wells,
            dataref: dataref.to_string(),
        });
        Ok(())
    }

    // The instruction document, {"refs": .., "instructions": ..}, with
    // every well and container resolved to its ref address.
    pub fn to_document(&self) -> Result<Value> {
        let mut refs = Map::new();
        for (name, r) in &self.refs {
            refs.insert(name.clone(), r.to_value());
        }
        let instructions = self
            .instructions
            .iter()
            .map(|instruction| instruction.to_value(self))
            .collect::<Result<Vec<_>>>()?;
        let mut document = Map::new();
        document.insert("refs".to_string(), Value::Object(refs));
        document.insert("instructions".to_string(), Value::Array(instructions));
        Ok(Value::Object(document))
    }
}

impl RefResolver for Protocol {
    fn refname_for(&self, container_uid: u64) -> Option<&str> {
        self.refs
            .values()
            .find(|r| r.container.uid() == container_uid)
            .map(|r| r.name.as_str())
    }
}

// Drains a shared source pool into the destinations in order, producing
// (source, destination, microliters) triples.
fn apportion_pool(
    sources: &[Well],
    destinations: &[Well],
    requested_ul: &[f64],
) -> Result<Vec<(Well, Well, f64)>> {
    let mut balances = Vec::with_capacity(sources.len());
    for source in sources {
        let volume = source.volume().ok_or_else(|| ProtocolError {
            code: ErrorCode::InvalidArgument,
            message: format!(
                "one_source needs a tracked volume on every source well; well {} has none",
                source.index()
            ),
        })?;
        balances.push(volume.value);
    }
    let pool = round12(balances.iter().sum());
    let wanted = round12(requested_ul.iter().sum());
    if wanted > pool {
        return Err(ProtocolError {
            code: ErrorCode::InsufficientVolume,
            message: format!(
                "Transfer requests {wanted} microliters but the source pool holds {pool}"
            ),
        });
    }

    // When every source can cover its own destination, keep the 1:1
    // pairing.
    if sources.len() == destinations.len()
        && balances
            .iter()
            .zip(requested_ul)
            .all(|(held, wanted)| held >= wanted)
    {
        return Ok(sources
            .iter()
            .cloned()
            .zip(destinations.iter().cloned())
            .zip(requested_ul.iter().copied())
            .map(|((source, destination), volume_ul)| (source, destination, volume_ul))
            .collect());
    }

    // Sequential bin fill: drain each source before moving to the next.
    let mut triples = Vec::new();
    let mut src_i = 0;
    for (destination, &wanted) in destinations.iter().zip(requested_ul) {
        let mut remaining = wanted;
        while remaining > 0.0 {
            let Some(available) = balances.get(src_i).copied() else {
                // The pool sum was checked above.
                return Err(ProtocolError {
                    code: ErrorCode::InsufficientVolume,
                    message: "Source pool ran dry while apportioning".to_string(),
                });
            };
            if available <= 0.0 {
                src_i += 1;
                continue;
            }
            let draw = available.min(remaining);
            triples.push((sources[src_i].clone(), destination.clone(), draw));
            balances[src_i] = round12(available - draw);
            remaining = round12(remaining - draw);
            if balances[src_i] <= 0.0 {
                src_i += 1;
            }
        }
    }
    Ok(triples)
}
