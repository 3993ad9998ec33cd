use crate::container_type::ContainerType;
use crate::error::{ErrorCode, ProtocolError, Result};
use crate::unit::Unit;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct WellState {
    name: Option<String>,
    volume: Option<Unit>,
    properties: HashMap<String, Value>,
}

// A cheap handle to one location on a container. Clones share state;
// equality is identity.
#[derive(Clone, Debug)]
pub struct Well {
    container_uid: u64,
    container_type: Arc<ContainerType>,
    index: usize,
    state: Arc<RwLock<WellState>>,
}

impl Well {
    pub(crate) fn new(container_uid: u64, container_type: Arc<ContainerType>, index: usize) -> Self {
        Self {
            container_uid,
            container_type,
            index,
            state: Arc::new(RwLock::new(WellState::default())),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn container_type(&self) -> &ContainerType {
        &self.container_type
    }

    pub(crate) fn container_uid(&self) -> u64 {
        self.container_uid
    }

    pub fn label(&self) -> Result<String> {
        self.container_type.humanize(self.index)
    }

    pub fn name(&self) -> Option<String> {
        self.state.read().unwrap().name.clone()
    }

    pub fn set_name(&self, name: &str) {
        self.state.write().unwrap().name = Some(name.to_string());
    }

    pub fn volume(&self) -> Option<Unit> {
        self.state.read().unwrap().volume.clone()
    }

    // Microliter quantities only, capped at the well capacity. There is no
    // lower bound.
    pub fn set_volume(&self, volume: Unit) -> Result<()> {
        if volume.unit != "microliter" {
            return Err(ProtocolError {
                code: ErrorCode::UnitMismatch,
                message: format!(
                    "Well volumes are tracked in microliters, got '{}'",
                    volume.unit
                ),
            });
        }
        if volume.value > self.container_type.well_volume_ul {
            return Err(ProtocolError {
                code: ErrorCode::CapacityExceeded,
                message: format!(
                    "{volume} exceeds the {} microliter capacity of a {} well",
                    self.container_type.well_volume_ul, self.container_type.shortname
                ),
            });
        }
        self.state.write().unwrap().volume = Some(volume);
        Ok(())
    }

    pub fn properties(&self) -> HashMap<String, Value> {
        self.state.read().unwrap().properties.clone()
    }

    // Merge, not replace. Existing keys are overwritten.
    pub fn add_properties(&self, properties: &HashMap<String, Value>) {
        let mut state = self.state.write().unwrap();
        for (key, value) in properties {
            state.properties.insert(key.clone(), value.clone());
        }
    }

    pub fn set_property(&self, key: &str, value: Value) {
        self.state
            .write()
            .unwrap()
            .properties
            .insert(key.to_string(), value);
    }
}

impl PartialEq for Well {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Eq for Well {}
