use crate::error::{ErrorCode, ProtocolError, Result};
use crate::unit::Unit;
use crate::well::Well;
use serde_json::Value;
use std::collections::HashMap;
use std::ops::{Add, Index};

// An ordered collection of wells, duplicates allowed, containers mixed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WellGroup {
    wells: Vec<Well>,
}

impl WellGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, well: Well) {
        self.wells.push(well);
    }

    pub fn len(&self) -> usize {
        self.wells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wells.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Well> {
        self.wells.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Well> {
        self.wells.iter()
    }

    // Humanized member labels, group order. Mixed containers fail.
    pub fn indices(&self) -> Result<Vec<String>> {
        let mut labels = Vec::with_capacity(self.wells.len());
        let mut container = None;
        for well in &self.wells {
            match container {
                None => container = Some(well.container_uid()),
                Some(uid) if uid == well.container_uid() => {}
                Some(_) => {
                    return Err(ProtocolError {
                        code: ErrorCode::HeterogeneousGroup,
                        message: "All wells in the group must come from one container"
                            .to_string(),
                    });
                }
            }
            labels.push(well.label()?);
        }
        Ok(labels)
    }

    pub fn set_volume(&self, volume: Unit) -> Result<()> {
        for well in &self.wells {
            well.set_volume(volume.clone())?;
        }
        Ok(())
    }

    pub fn add_properties(&self, properties: &HashMap<String, Value>) {
        for well in &self.wells {
            well.add_properties(properties);
        }
    }
}

impl From<Well> for WellGroup {
    fn from(well: Well) -> Self {
        Self { wells: vec![well] }
    }
}

impl From<&Well> for WellGroup {
    fn from(well: &Well) -> Self {
        Self {
            wells: vec![well.clone()],
        }
    }
}

impl From<Vec<Well>> for WellGroup {
    fn from(wells: Vec<Well>) -> Self {
        Self { wells }
    }
}

impl FromIterator<Well> for WellGroup {
    fn from_iter<I: IntoIterator<Item = Well>>(iter: I) -> Self {
        Self {
            wells: iter.into_iter().collect(),
        }
    }
}

impl Index<usize> for WellGroup {
    type Output = Well;

    fn index(&self, index: usize) -> &Well {
        &self.wells[index]
    }
}

impl IntoIterator for WellGroup {
    type Item = Well;
    type IntoIter = std::vec::IntoIter<Well>;

    fn into_iter(self) -> Self::IntoIter {
        self.wells.into_iter()
    }
}

impl<'a> IntoIterator for &'a WellGroup {
    type Item = &'a Well;
    type IntoIter = std::slice::Iter<'a, Well>;

    fn into_iter(self) -> Self::IntoIter {
        self.wells.iter()
    }
}

impl Add<WellGroup> for WellGroup {
    type Output = WellGroup;

    fn add(mut self, rhs: WellGroup) -> WellGroup {
        self.wells.extend(rhs.wells);
        self
    }
}

impl Add<Well> for WellGroup {
    type Output = WellGroup;

    fn add(mut self, rhs: Well) -> WellGroup {
        self.wells.push(rhs);
        self
    }
}
