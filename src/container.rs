use crate::container_type::{ContainerType, WellSelector};
use crate::error::{ErrorCode, ProtocolError, Result};
use crate::well::Well;
use crate::well_group::WellGroup;
use itertools::Itertools;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_CONTAINER_UID: AtomicU64 = AtomicU64::new(1);

// Quadrant reference: 0..=3 or the labels A1, A2, B1, B2.
#[derive(Clone, Debug)]
pub enum QuadrantSelector {
    Index(i64),
    Label(String),
}

impl QuadrantSelector {
    fn resolve(&self) -> Result<usize> {
        let quad = match self {
            Self::Index(i) => *i,
            Self::Label(label) => match label.trim().to_ascii_uppercase().as_str() {
                "A1" => 0,
                "A2" => 1,
                "B1" => 2,
                "B2" => 3,
                other => {
                    return Err(ProtocolError {
                        code: ErrorCode::InvalidArgument,
                        message: format!("'{other}' is not a quadrant (A1, A2, B1 or B2)"),
                    });
                }
            },
        };
        if !(0..=3).contains(&quad) {
            return Err(ProtocolError {
                code: ErrorCode::InvalidArgument,
                message: format!("Quadrant index must be 0 to 3, got {quad}"),
            });
        }
        Ok(quad as usize)
    }
}

impl From<i32> for QuadrantSelector {
    fn from(index: i32) -> Self {
        Self::Index(index as i64)
    }
}

impl From<i64> for QuadrantSelector {
    fn from(index: i64) -> Self {
        Self::Index(index)
    }
}

impl From<usize> for QuadrantSelector {
    fn from(index: usize) -> Self {
        Self::Index(index as i64)
    }
}

impl From<&str> for QuadrantSelector {
    fn from(label: &str) -> Self {
        Self::Label(label.to_string())
    }
}

impl From<String> for QuadrantSelector {
    fn from(label: String) -> Self {
        Self::Label(label)
    }
}

#[derive(Debug)]
struct ContainerInner {
    uid: u64,
    id: Option<String>,
    name: Option<String>,
    storage: Option<String>,
    container_type: Arc<ContainerType>,
    wells: Vec<Well>,
}

// A physical container bound to a layout. All wells are created eagerly;
// clones share them, and equality is identity.
#[derive(Clone, Debug)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    pub(crate) fn new(
        container_type: ContainerType,
        id: Option<String>,
        name: Option<String>,
        storage: Option<String>,
    ) -> Self {
        let uid = NEXT_CONTAINER_UID.fetch_add(1, Ordering::Relaxed);
        let container_type = Arc::new(container_type);
        let wells = (0..container_type.well_count)
            .map(|index| Well::new(uid, container_type.clone(), index))
            .collect();
        Self {
            inner: Arc::new(ContainerInner {
                uid,
                id,
                name,
                storage,
                container_type,
                wells,
            }),
        }
    }

    // Process-unique, the key ref lookups go by during serialization.
    pub fn uid(&self) -> u64 {
        self.inner.uid
    }

    pub fn id(&self) -> Option<&str> {
        self.inner.id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn storage(&self) -> Option<&str> {
        self.inner.storage.as_deref()
    }

    pub fn container_type(&self) -> &ContainerType {
        &self.inner.container_type
    }

    pub fn well_count(&self) -> usize {
        self.inner.container_type.well_count
    }

    pub fn col_count(&self) -> usize {
        self.inner.container_type.col_count
    }

    pub fn row_count(&self) -> usize {
        self.inner.container_type.row_count()
    }

    pub fn robotize(&self, sel: impl Into<WellSelector>) -> Result<usize> {
        self.inner.container_type.robotize(sel)
    }

    pub fn humanize(&self, index: usize) -> Result<String> {
        self.inner.container_type.humanize(index)
    }

    pub fn decompose(&self, sel: impl Into<WellSelector>) -> Result<(usize, usize)> {
        self.inner.container_type.decompose(sel)
    }

    // Same reference, same Well instance, every time.
    pub fn well(&self, sel: impl Into<WellSelector>) -> Result<Well> {
        let index = self.robotize(sel)?;
        Ok(self.inner.wells[index].clone())
    }

    pub fn wells<I>(&self, sels: I) -> Result<WellGroup>
    where
        I: IntoIterator,
        I::Item: Into<WellSelector>,
    {
        sels.into_iter().map(|sel| self.well(sel)).collect()
    }

    pub fn all_wells(&self, columnwise: bool) -> WellGroup {
        if columnwise {
            (0..self.col_count())
                .cartesian_product(0..self.row_count())
                .map(|(col, row)| self.inner.wells[row * self.col_count() + col].clone())
                .collect()
        } else {
            WellGroup::from(self.inner.wells.clone())
        }
    }

    // Everything but the plate edge.
    pub fn inner_wells(&self, columnwise: bool) -> WellGroup {
        let rows = self.row_count();
        let cols = self.col_count();
        if columnwise {
            (1..cols - 1)
                .cartesian_product(1..rows - 1)
                .map(|(col, row)| self.inner.wells[row * cols + col].clone())
                .collect()
        } else {
            (1..rows - 1)
                .cartesian_product(1..cols - 1)
                .map(|(row, col)| self.inner.wells[row * cols + col].clone())
                .collect()
        }
    }

    pub fn wells_from(
        &self,
        start: impl Into<WellSelector>,
        num: usize,
        columnwise: bool,
    ) -> Result<WellGroup> {
        let start = self.robotize(start)?;
        let position = if columnwise {
            let row = start / self.col_count();
            let col = start % self.col_count();
            col * self.row_count() + row
        } else {
            start
        };
        if num > self.well_count() - position {
            return Err(ProtocolError {
                code: ErrorCode::OutOfRange,
                message: format!(
                    "Cannot take {num} wells starting at position {position}; only {} remain",
                    self.well_count() - position
                ),
            });
        }
        let ordered = self.all_wells(columnwise);
        Ok(ordered.iter().skip(position).take(num).cloned().collect())
    }

    // One of the four interleaved 96-well sub-grids of a 384-well plate.
    // A 96-well plate only has quadrant 0, the whole plate.
    pub fn quadrant(&self, quad: impl Into<QuadrantSelector>) -> Result<WellGroup> {
        let quad = quad.into().resolve()?;
        if self.well_count() < 96 {
            return Err(ProtocolError {
                code: ErrorCode::Unsupported,
                message: format!(
                    "Quadrant selection needs at least 96 wells; {} has {}",
                    self.container_type().shortname,
                    self.well_count()
                ),
            });
        }
        if self.well_count() == 96 {
            if quad != 0 {
                return Err(ProtocolError {
                    code: ErrorCode::InvalidArgument,
                    message: "A 96-well plate only has quadrant 0".to_string(),
                });
            }
            return Ok(self.all_wells(false));
        }
        let row_offset = quad / 2;
        let col_offset = quad % 2;
        Ok((row_offset..self.row_count())
            .step_by(2)
            .cartesian_product((col_offset..self.col_count()).step_by(2))
            .map(|(row, col)| self.inner.wells[row * self.col_count() + col].clone())
            .collect())
    }
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Container {}
