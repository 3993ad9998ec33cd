// The fixed instruction vocabulary and its wire serialization

use crate::container::Container;
use crate::error::{ErrorCode, ProtocolError, Result};
use crate::unit::Unit;
use crate::well::Well;
use crate::well_group::WellGroup;
use serde_json::{Map, Value};

// Maps a container back to its protocol-level ref name.
pub trait RefResolver {
    fn refname_for(&self, container_uid: u64) -> Option<&str>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Mix {
    pub volume: Unit,
    pub repetitions: u32,
    pub speed: Unit,
}

impl Mix {
    fn to_value(&self) -> Value {
        let mut fields = Map::new();
        fields.insert("volume".to_string(), Value::String(self.volume.to_string()));
        fields.insert("repetitions".to_string(), Value::from(self.repetitions));
        fields.insert("speed".to_string(), Value::String(self.speed.to_string()));
        Value::Object(fields)
    }
}

// One atomic pipetting step.
#[derive(Clone, Debug)]
pub struct TransferRecord {
    pub from: Well,
    pub to: Well,
    pub volume: Unit,
    pub mix_before: Option<Mix>,
    pub mix_after: Option<Mix>,
    pub aspirate_speed: Option<Unit>,
    pub dispense_speed: Option<Unit>,
}

impl TransferRecord {
    fn to_value(&self, resolver: &dyn RefResolver) -> Result<Value> {
        let mut fields = Map::new();
        fields.insert("from".to_string(), well_address(&self.from, resolver)?);
        fields.insert("to".to_string(), well_address(&self.to, resolver)?);
        fields.insert("volume".to_string(), Value::String(self.volume.to_string()));
        if let Some(mix) = &self.mix_before {
            fields.insert("mix_before".to_string(), mix.to_value());
        }
        if let Some(mix) = &self.mix_after {
            fields.insert("mix_after".to_string(), mix.to_value());
        }
        if let Some(speed) = &self.aspirate_speed {
            fields.insert(
                "aspirate_speed".to_string(),
                Value::String(speed.to_string()),
            );
        }
        if let Some(speed) = &self.dispense_speed {
            fields.insert(
                "dispense_speed".to_string(),
                Value::String(speed.to_string()),
            );
        }
        Ok(Value::Object(fields))
    }
}

// Transfers sharing one tip.
#[derive(Clone, Debug, Default)]
pub struct PipetteGroup {
    pub tip_type: Option<String>,
    pub transfers: Vec<TransferRecord>,
}

impl PipetteGroup {
    fn to_value(&self, resolver: &dyn RefResolver) -> Result<Value> {
        let mut fields = Map::new();
        if let Some(tip_type) = &self.tip_type {
            fields.insert("x_tip_type".to_string(), Value::String(tip_type.clone()));
        }
        let transfers = self
            .transfers
            .iter()
            .map(|t| t.to_value(resolver))
            .collect::<Result<Vec<_>>>()?;
        fields.insert("transfer".to_string(), Value::Array(transfers));
        Ok(Value::Object(fields))
    }
}

#[derive(Clone, Debug)]
pub struct DispenseColumn {
    pub column: usize,
    pub volume: Unit,
}

#[derive(Clone, Debug)]
pub enum Instruction {
    Pipette {
        groups: Vec<PipetteGroup>,
    },
    Incubate {
        object: Container,
        location: String,
        duration: Unit,
        shaking: bool,
    },
    Dispense {
        object: Container,
        reagent: String,
        columns: Vec<DispenseColumn>,
    },
    Cover {
        object: Container,
        lid: String,
    },
    Uncover {
        object: Container,
    },
    Luminescence {
        object: Container,
        wells: WellGroup,
        dataref: String,
    },
}

impl Instruction {
    pub fn op(&self) -> &'static str {
        match self {
            Self::Pipette { .. } => "pipette",
            Self::Incubate { .. } => "incubate",
            Self::Dispense { .. } => "dispense",
            Self::Cover { .. } => "cover",
            Self::Uncover { .. } => "uncover",
            Self::Luminescence { .. } => "luminescence",
        }
    }

    pub fn to_value(&self, resolver: &dyn RefResolver) -> Result<Value> {
        let mut fields = Map::new();
        fields.insert("op".to_string(), Value::String(self.op().to_string()));
        match self {
            Self::Pipette { groups } => {
                let groups = groups
                    .iter()
                    .map(|g| g.to_value(resolver))
                    .collect::<Result<Vec<_>>>()?;
                fields.insert("groups".to_string(), Value::Array(groups));
            }
            Self::Incubate {
                object,
                location,
                duration,
                shaking,
            } => {
                fields.insert("object".to_string(), container_address(object, resolver)?);
                fields.insert("where".to_string(), Value::String(location.clone()));
                fields.insert(
                    "duration".to_string(),
                    Value::String(duration.to_string()),
                );
                fields.insert("shaking".to_string(), Value::Bool(*shaking));
            }
            Self::Dispense {
                object,
                reagent,
                columns,
            } => {
                fields.insert("object".to_string(), container_address(object, resolver)?);
                fields.insert("reagent".to_string(), Value::String(reagent.clone()));
                let columns = columns
                    .iter()
                    .map(|c| {
                        let mut col = Map::new();
                        col.insert("column".to_string(), Value::from(c.column));
                        col.insert("volume".to_string(), Value::String(c.volume.to_string()));
                        Value::Object(col)
                    })
                    .collect();
                fields.insert("columns".to_string(), Value::Array(columns));
            }
            Self::Cover { object, lid } => {
                fields.insert("object".to_string(), container_address(object, resolver)?);
                fields.insert("lid".to_string(), Value::String(lid.clone()));
            }
            Self::Uncover { object } => {
                fields.insert("object".to_string(), container_address(object, resolver)?);
            }
            Self::Luminescence {
                object,
                wells,
                dataref,
            } => {
                fields.insert("object".to_string(), container_address(object, resolver)?);
                let wells = wells
                    .iter()
                    .map(|w| well_address(w, resolver))
                    .collect::<Result<Vec<_>>>()?;
                fields.insert("wells".to_string(), Value::Array(wells));
                fields.insert("dataref".to_string(), Value::String(dataref.clone()));
            }
        }
        Ok(Value::Object(fields))
    }
}

// The wire address of a well, "<refname>/<index>".
pub(crate) fn well_address(well: &Well, resolver: &dyn RefResolver) -> Result<Value> {
    let name = resolver
        .refname_for(well.container_uid())
        .ok_or_else(|| ProtocolError {
            code: ErrorCode::UnresolvedReference,
            message: format!("Well {} belongs to a container with no ref", well.index()),
        })?;
    Ok(Value::String(format!("{name}/{}", well.index())))
}

fn container_address(container: &Container, resolver: &dyn RefResolver) -> Result<Value> {
    let name = resolver
        .refname_for(container.uid())
        .ok_or_else(|| ProtocolError {
            code: ErrorCode::UnresolvedReference,
            message: "Instruction references a container with no ref".to_string(),
        })?;
    Ok(Value::String(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CONTAINER_TYPES;

    struct NoRefs;

    impl RefResolver for NoRefs {
        fn refname_for(&self, _container_uid: u64) -> Option<&str> {
            None
        }
    }

    struct OneRef(u64);

    impl RefResolver for OneRef {
        fn refname_for(&self, container_uid: u64) -> Option<&str> {
            (container_uid == self.0).then_some("plate")
        }
    }

    fn plate() -> Container {
        Container::new(
            CONTAINER_TYPES.get("96-flat").unwrap().clone(),
            None,
            None,
            None,
        )
    }

    #[test]
    fn test_op_tags() {
        let c = plate();
        let cases = [
            (Instruction::Pipette { groups: vec![] }, "pipette"),
            (
                Instruction::Incubate {
                    object: c.clone(),
                    location: "ambient".to_string(),
                    duration: Unit::new(5.0, "minute"),
                    shaking: false,
                },
                "incubate",
            ),
            (
                Instruction::Dispense {
                    object: c.clone(),
                    reagent: "water".to_string(),
                    columns: vec![],
                },
                "dispense",
            ),
            (
                Instruction::Cover {
                    object: c.clone(),
                    lid: "standard".to_string(),
                },
                "cover",
            ),
            (Instruction::Uncover { object: c.clone() }, "uncover"),
            (
                Instruction::Luminescence {
                    object: c.clone(),
                    wells: WellGroup::new(),
                    dataref: "read1".to_string(),
                },
                "luminescence",
            ),
        ];
        for (instruction, tag) in cases {
            assert_eq!(instruction.op(), tag);
        }
    }

    #[test]
    fn test_pipette_serialization_shape() {
        let c = plate();
        let record = TransferRecord {
            from: c.well(0).unwrap(),
            to: c.well(1).unwrap(),
            volume: Unit::microliters(20.0),
            mix_before: Some(Mix {
                volume: Unit::microliters(10.0),
                repetitions: 10,
                speed: Unit::new(100.0, "microliter/second"),
            }),
            mix_after: None,
            aspirate_speed: None,
            dispense_speed: Some(Unit::new(120.0, "microliter/second")),
        };
        let instruction = Instruction::Pipette {
            groups: vec![PipetteGroup {
                tip_type: Some("filtered50".to_string()),
                transfers: vec![record],
            }],
        };

        let value = instruction.to_value(&OneRef(c.uid())).unwrap();
        assert_eq!(value["op"], "pipette");
        let group = &value["groups"][0];
        assert_eq!(group["x_tip_type"], "filtered50");
        let xfer = &group["transfer"][0];
        assert_eq!(xfer["from"], "plate/0");
        assert_eq!(xfer["to"], "plate/1");
        assert_eq!(xfer["volume"], "20.0:microliter");
        assert_eq!(xfer["mix_before"]["volume"], "10.0:microliter");
        assert_eq!(xfer["mix_before"]["repetitions"], 10);
        assert_eq!(
            xfer["mix_before"]["speed"],
            "100.0:microliter/second"
        );
        assert!(xfer.get("mix_after").is_none());
        assert!(xfer.get("aspirate_speed").is_none());
        assert_eq!(xfer["dispense_speed"], "120.0:microliter/second");
    }

    #[test]
    fn test_incubate_serialization_shape() {
        let c = plate();
        let instruction = Instruction::Incubate {
            object: c.clone(),
            location: "warm_37".to_string(),
            duration: Unit::new(30.0, "minute"),
            shaking: true,
        };
        let value = instruction.to_value(&OneRef(c.uid())).unwrap();
        assert_eq!(value["object"], "plate");
        assert_eq!(value["where"], "warm_37");
        assert_eq!(value["duration"], "30.0:minute");
        assert_eq!(value["shaking"], true);
    }

    #[test]
    fn test_unresolved_container_fails() {
        let c = plate();
        let instruction = Instruction::Cover {
            object: c.clone(),
            lid: "standard".to_string(),
        };
        assert_eq!(
            instruction.to_value(&OneRef(c.uid())).unwrap()["object"],
            "plate"
        );
        assert_eq!(
            instruction.to_value(&NoRefs).unwrap_err().code,
            ErrorCode::UnresolvedReference
        );

        let lum = Instruction::Luminescence {
            object: c.clone(),
            wells: WellGroup::from(c.well("A1").unwrap()),
            dataref: "read1".to_string(),
        };
        assert_eq!(
            lum.to_value(&NoRefs).unwrap_err().code,
            ErrorCode::UnresolvedReference
        );
    }
}
