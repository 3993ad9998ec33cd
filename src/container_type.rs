// Plate and tube layout descriptors and the built-in container catalogue

use crate::error::{ErrorCode, ProtocolError, Result};
use crate::well::Well;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;

const BUILTIN_CONTAINER_TYPES_JSON: &str = include_str!("../assets/container_types.json");

lazy_static! {
    static ref WELL_LABEL: Regex = Regex::new(r"([A-Za-z])(\d+)$").expect("well label pattern");
}

// A well reference the way callers write one: an index, a label like "B3",
// or a Well already in hand.
#[derive(Clone, Debug)]
pub enum WellSelector {
    Index(i64),
    Label(String),
    Well(Well),
}

impl From<i64> for WellSelector {
    fn from(index: i64) -> Self {
        Self::Index(index)
    }
}

impl From<i32> for WellSelector {
    fn from(index: i32) -> Self {
        Self::Index(index as i64)
    }
}

impl From<usize> for WellSelector {
    fn from(index: usize) -> Self {
        Self::Index(index as i64)
    }
}

impl From<&str> for WellSelector {
    fn from(label: &str) -> Self {
        Self::Label(label.to_string())
    }
}

impl From<String> for WellSelector {
    fn from(label: String) -> Self {
        Self::Label(label)
    }
}

impl From<Well> for WellSelector {
    fn from(well: Well) -> Self {
        Self::Well(well)
    }
}

impl From<&Well> for WellSelector {
    fn from(well: &Well) -> Self {
        Self::Well(well.clone())
    }
}

#[derive(Clone, Debug)]
pub enum ContainerTypeSelector {
    Shortname(String),
    Custom(ContainerType),
}

impl From<&str> for ContainerTypeSelector {
    fn from(shortname: &str) -> Self {
        Self::Shortname(shortname.to_string())
    }
}

impl From<String> for ContainerTypeSelector {
    fn from(shortname: String) -> Self {
        Self::Shortname(shortname)
    }
}

impl From<ContainerType> for ContainerTypeSelector {
    fn from(container_type: ContainerType) -> Self {
        Self::Custom(container_type)
    }
}

// Wells are numbered row by row: index = row * col_count + col. Labels pair
// an uppercase row letter with a 1-based column number, so "B3" on a
// 12-column plate is index 14.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContainerType {
    pub name: String,
    pub shortname: String,
    pub is_tube: bool,
    pub well_count: usize,
    pub col_count: usize,
    pub well_volume_ul: f64,
    pub dead_volume_ul: f64,
    #[serde(default)]
    pub well_depth_mm: Option<f64>,
    #[serde(default)]
    pub well_coating: Option<String>,
    #[serde(default)]
    pub sterile: Option<bool>,
    #[serde(default)]
    pub capabilities: HashSet<String>,
}

impl ContainerType {
    pub fn row_count(&self) -> usize {
        self.well_count / self.col_count
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn robotize(&self, sel: impl Into<WellSelector>) -> Result<usize> {
        let sel = sel.into();
        let index = match &sel {
            WellSelector::Index(i) => usize::try_from(*i).map_err(|_| ProtocolError {
                code: ErrorCode::OutOfRange,
                message: format!("Well index {i} is negative"),
            })?,
            WellSelector::Well(well) => well.index(),
            WellSelector::Label(text) => self.robotize_label(text)?,
        };
        if index >= self.well_count {
            return Err(ProtocolError {
                code: ErrorCode::OutOfRange,
                message: format!(
                    "Well {index} does not exist on {} ({} wells)",
                    self.shortname, self.well_count
                ),
            });
        }
        Ok(index)
    }

    fn robotize_label(&self, text: &str) -> Result<usize> {
        let text = text.trim();
        let Some(caps) = WELL_LABEL.captures(text) else {
            return text.parse::<usize>().map_err(|_| ProtocolError {
                code: ErrorCode::InvalidFormat,
                message: format!("'{text}' is neither a well label nor an index"),
            });
        };
        let row = (caps[1].as_bytes()[0].to_ascii_uppercase() - b'A') as usize;
        let number: usize = caps[2].parse().map_err(|_| ProtocolError {
            code: ErrorCode::OutOfRange,
            message: format!("Column number in '{text}' is too large"),
        })?;
        let col = number.checked_sub(1).ok_or_else(|| ProtocolError {
            code: ErrorCode::OutOfRange,
            message: format!("Column numbers start at 1, got '{text}'"),
        })?;
        if row >= self.row_count() || col >= self.col_count {
            return Err(ProtocolError {
                code: ErrorCode::OutOfRange,
                message: format!(
                    "Well '{text}' does not fit the {} rows x {} columns of {}",
                    self.row_count(),
                    self.col_count,
                    self.shortname
                ),
            });
        }
        Ok(row * self.col_count + col)
    }

    // Inverse of robotize.
    pub fn humanize(&self, index: usize) -> Result<String> {
        if index >= self.well_count {
            return Err(ProtocolError {
                code: ErrorCode::OutOfRange,
                message: format!(
                    "Well {index} does not exist on {} ({} wells)",
                    self.shortname, self.well_count
                ),
            });
        }
        let row = index / self.col_count;
        let col = index % self.col_count;
        if row > 25 {
            return Err(ProtocolError {
                code: ErrorCode::OutOfRange,
                message: format!("Row {row} is past 'Z' and has no single-letter label"),
            });
        }
        Ok(format!("{}{}", (b'A' + row as u8) as char, col + 1))
    }

    pub fn decompose(&self, sel: impl Into<WellSelector>) -> Result<(usize, usize)> {
        let index = self.robotize(sel)?;
        Ok((index / self.col_count, index % self.col_count))
    }
}

#[derive(Clone, Debug)]
pub struct ContainerTypeCatalog {
    types: HashMap<String, ContainerType>,
}

impl ContainerTypeCatalog {
    pub fn from_json_str(data: &str) -> Result<Self> {
        let mut types = HashMap::new();
        let rows: serde_json::Value = serde_json::from_str(data).map_err(|e| ProtocolError {
            code: ErrorCode::InvalidFormat,
            message: format!("Container type catalogue is not valid JSON: {e}"),
        })?;
        let arr = rows.as_array().ok_or_else(|| ProtocolError {
            code: ErrorCode::InvalidFormat,
            message: "Container type catalogue is not a JSON array".to_string(),
        })?;
        for row in arr {
            let ct: ContainerType = match serde_json::from_value(row.clone()) {
                Ok(ct) => ct,
                Err(e) => {
                    eprintln!("Bad container type: {row}: {e}");
                    continue;
                }
            };
            if ct.well_count == 0 || ct.col_count == 0 || ct.well_count % ct.col_count != 0 {
                eprintln!(
                    "Bad container type '{}': {} wells do not divide into {} columns",
                    ct.shortname, ct.well_count, ct.col_count
                );
                continue;
            }
            if types.contains_key(&ct.shortname) {
                eprintln!("Duplicate container type '{}'", ct.shortname);
                continue;
            }
            types.insert(ct.shortname.clone(), ct);
        }
        Ok(Self { types })
    }

    pub fn from_json_file(path: &str) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| ProtocolError {
            code: ErrorCode::InvalidArgument,
            message: format!("Could not read container type catalogue '{path}': {e}"),
        })?;
        Self::from_json_str(&text)
    }

    pub fn get(&self, shortname: &str) -> Option<&ContainerType> {
        self.types.get(shortname)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContainerType> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn shortnames_sorted(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

impl Default for ContainerTypeCatalog {
    fn default() -> Self {
        Self::from_json_str(BUILTIN_CONTAINER_TYPES_JSON)
            .expect("Invalid builtin container type catalogue")
    }
}
