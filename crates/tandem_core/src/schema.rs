//! # Renderable Wire Schema
//!
//! Byte layout of one triple-buffer region. Structure-of-arrays, one slot
//! per entity id up to `max_entities`:
//!
//! ```text
//! ┌───────────────────────┬──────────────────┬──────────────┬─────────────┬──────────┐
//! │ worldMatrix  64B × N  │ needsUpdate 1B×N │ resourceId   │ interpolate │ visible  │
//! │ (16 × f32)            │                  │ 4B × N       │ 1B × N      │ 1B × N   │
//! └───────────────────────┴──────────────────┴──────────────┴─────────────┴──────────┘
//! ```
//!
//! Producer and consumer must change this order in lockstep.

use thiserror::Error;

use crate::cursor::{CursorError, CursorView};
use crate::math::Mat4;
use crate::EntityId;

/// Bytes per world matrix.
const MATRIX_BYTES: usize = Mat4::LEN * 4;

/// Errors from schema reads and writes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaError {
    /// Entity id is past the configured maximum.
    #[error("entity {entity} exceeds schema capacity {max}")]
    EntityOutOfRange {
        /// Offending entity.
        entity: EntityId,
        /// Configured maximum.
        max: usize,
    },

    /// The region is smaller than the schema expects.
    #[error(transparent)]
    Cursor(#[from] CursorError),
}

/// Per-entity state carried by the channel each tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderableState {
    /// World transform.
    pub world_matrix: Mat4,
    /// Set when `world_matrix` changed this tick.
    pub world_matrix_needs_update: bool,
    /// Bound resource (0 = none).
    pub resource_id: u32,
    /// Blend toward the new transform instead of snapping.
    pub interpolate: bool,
    /// Whether the entity is drawn.
    pub visible: bool,
}

impl Default for RenderableState {
    fn default() -> Self {
        Self {
            world_matrix: Mat4::IDENTITY,
            world_matrix_needs_update: false,
            resource_id: 0,
            interpolate: false,
            visible: true,
        }
    }
}

/// Offsets of every field for a fixed entity capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderableSchema {
    max_entities: usize,
    needs_update_base: usize,
    resource_id_base: usize,
    interpolate_base: usize,
    visible_base: usize,
    region_size: usize,
}

impl RenderableSchema {
    /// Computes the layout for `max_entities` slots.
    #[must_use]
    pub const fn new(max_entities: usize) -> Self {
        let needs_update_base = max_entities * MATRIX_BYTES;
        let resource_id_base = needs_update_base + max_entities;
        let interpolate_base = resource_id_base + max_entities * 4;
        let visible_base = interpolate_base + max_entities;
        Self {
            max_entities,
            needs_update_base,
            resource_id_base,
            interpolate_base,
            visible_base,
            region_size: visible_base + max_entities,
        }
    }

    /// Entity capacity.
    #[inline]
    #[must_use]
    pub const fn max_entities(&self) -> usize {
        self.max_entities
    }

    /// Total bytes in one region.
    #[inline]
    #[must_use]
    pub const fn region_size(&self) -> usize {
        self.region_size
    }

    /// Allocates a zeroed, fixed-size region for this schema.
    #[must_use]
    pub fn create_region(&self) -> CursorView {
        CursorView::fixed(self.region_size)
    }

    #[inline]
    fn slot(&self, entity: EntityId) -> Result<usize, SchemaError> {
        let slot = entity as usize;
        if slot < self.max_entities {
            Ok(slot)
        } else {
            Err(SchemaError::EntityOutOfRange {
                entity,
                max: self.max_entities,
            })
        }
    }

    /// Writes `state` for `entity` using change-aware writes.
    ///
    /// Returns how many fields actually changed in this region. Each region
    /// keeps its own shadow, so an unchanged field means the region already
    /// holds that value.
    ///
    /// # Errors
    ///
    /// Fails if `entity` is out of range or the region is too small.
    pub fn write_entity(
        &self,
        region: &mut CursorView,
        entity: EntityId,
        state: &RenderableState,
    ) -> Result<usize, SchemaError> {
        let slot = self.slot(entity)?;
        let mut written = 0;

        let matrix_base = slot * MATRIX_BYTES;
        for (i, &value) in state.world_matrix.elements.iter().enumerate() {
            region.seek(matrix_base + i * 4)?;
            written += usize::from(region.write_if_changed(value)?);
        }

        let bytes = [
            (self.needs_update_base + slot, u8::from(state.world_matrix_needs_update)),
            (self.interpolate_base + slot, u8::from(state.interpolate)),
            (self.visible_base + slot, u8::from(state.visible)),
        ];
        for (offset, value) in bytes {
            region.seek(offset)?;
            written += usize::from(region.write_if_changed(value)?);
        }

        region.seek(self.resource_id_base + slot * 4)?;
        written += usize::from(region.write_if_changed(state.resource_id)?);

        region.reset();
        Ok(written)
    }

    /// Reads the world matrix of `entity`.
    ///
    /// # Errors
    ///
    /// Fails if `entity` is out of range or the region is too small.
    pub fn read_world_matrix(&self, region: &CursorView, entity: EntityId) -> Result<Mat4, SchemaError> {
        let base = self.slot(entity)? * MATRIX_BYTES;
        let mut elements = [0.0f32; Mat4::LEN];
        for (i, element) in elements.iter_mut().enumerate() {
            *element = region.read_f32_at(base + i * 4)?;
        }
        Ok(Mat4::from_cols_array(elements))
    }

    /// Reads the needs-update flag of `entity`.
    ///
    /// # Errors
    ///
    /// Fails if `entity` is out of range or the region is too small.
    pub fn read_needs_update(&self, region: &CursorView, entity: EntityId) -> Result<bool, SchemaError> {
        Ok(region.read_u8_at(self.needs_update_base + self.slot(entity)?)? != 0)
    }

    /// Reads the resource id of `entity`.
    ///
    /// # Errors
    ///
    /// Fails if `entity` is out of range or the region is too small.
    pub fn read_resource_id(&self, region: &CursorView, entity: EntityId) -> Result<u32, SchemaError> {
        Ok(region.read_u32_at(self.resource_id_base + self.slot(entity)? * 4)?)
    }

    /// Reads the interpolate flag of `entity`.
    ///
    /// # Errors
    ///
    /// Fails if `entity` is out of range or the region is too small.
    pub fn read_interpolate(&self, region: &CursorView, entity: EntityId) -> Result<bool, SchemaError> {
        Ok(region.read_u8_at(self.interpolate_base + self.slot(entity)?)? != 0)
    }

    /// Reads the visible flag of `entity`.
    ///
    /// # Errors
    ///
    /// Fails if `entity` is out of range or the region is too small.
    pub fn read_visible(&self, region: &CursorView, entity: EntityId) -> Result<bool, SchemaError> {
        Ok(region.read_u8_at(self.visible_base + self.slot(entity)?)? != 0)
    }

    /// Reads every field of `entity`.
    ///
    /// # Errors
    ///
    /// Fails if `entity` is out of range or the region is too small.
    pub fn read_entity(&self, region: &CursorView, entity: EntityId) -> Result<RenderableState, SchemaError> {
        Ok(RenderableState {
            world_matrix: self.read_world_matrix(region, entity)?,
            world_matrix_needs_update: self.read_needs_update(region, entity)?,
            resource_id: self.read_resource_id(region, entity)?,
            interpolate: self.read_interpolate(region, entity)?,
            visible: self.read_visible(region, entity)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;

    #[test]
    fn test_layout_offsets() {
        let schema = RenderableSchema::new(10);
        assert_eq!(schema.region_size(), 10 * (64 + 1 + 4 + 1 + 1));
        assert_eq!(schema.create_region().len(), schema.region_size());
    }

    #[test]
    fn test_write_then_read_entity() {
        let schema = RenderableSchema::new(8);
        let mut region = schema.create_region();
        let state = RenderableState {
            world_matrix: Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)),
            world_matrix_needs_update: true,
            resource_id: 42,
            interpolate: true,
            visible: false,
        };

        let written = schema.write_entity(&mut region, 3, &state).unwrap();
        assert!(written > 0);
        assert_eq!(region.cursor(), 0);
        assert_eq!(schema.read_entity(&region, 3).unwrap(), state);

        // Neighbouring slots are untouched
        assert_eq!(schema.read_resource_id(&region, 2).unwrap(), 0);
        assert_eq!(schema.read_resource_id(&region, 4).unwrap(), 0);
    }

    #[test]
    fn test_rewrite_same_state_writes_nothing() {
        let schema = RenderableSchema::new(4);
        let mut region = schema.create_region();
        let state = RenderableState::default();

        // First write: every field is new to the shadow
        assert_eq!(schema.write_entity(&mut region, 1, &state).unwrap(), 16 + 4);
        assert_eq!(schema.write_entity(&mut region, 1, &state).unwrap(), 0);

        let moved = RenderableState {
            world_matrix: Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)),
            world_matrix_needs_update: true,
            ..state
        };
        // One matrix element plus the flag
        assert_eq!(schema.write_entity(&mut region, 1, &moved).unwrap(), 2);
    }

    #[test]
    fn test_entity_out_of_range() {
        let schema = RenderableSchema::new(4);
        let mut region = schema.create_region();
        assert_eq!(
            schema.write_entity(&mut region, 4, &RenderableState::default()),
            Err(SchemaError::EntityOutOfRange { entity: 4, max: 4 })
        );
        assert!(schema.read_visible(&region, 9).is_err());
    }

    #[test]
    fn test_region_too_small() {
        let schema = RenderableSchema::new(4);
        let mut short = CursorView::fixed(8);
        assert!(matches!(
            schema.write_entity(&mut short, 0, &RenderableState::default()),
            Err(SchemaError::Cursor(_))
        ));
    }
}
