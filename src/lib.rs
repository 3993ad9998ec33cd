use container_type::ContainerTypeCatalog;
use lazy_static::lazy_static;

pub mod container;
pub mod container_type;
pub mod error;
pub mod instruction;
pub mod protocol;
pub mod unit;
pub mod well;
pub mod well_group;

lazy_static! {
    // Plate and tube layout descriptors
    pub static ref CONTAINER_TYPES: ContainerTypeCatalog = ContainerTypeCatalog::default();
}
