//! # Material Registry
//!
//! Materials are small, mostly static, and defined at start-up. Every time a
//! material is added, the combined properties of its pair with every existing
//! material (itself included) are pushed to the native solver, so no pair is
//! ever left on solver defaults.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use solver::{MaterialHandle, NativeSolver, PairProperties};

use crate::error::{PhysicsError, Result};
use crate::types::MaterialId;

/// Softness applied to every material pair.
pub const PAIR_SOFTNESS: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialDefinition {
    pub elasticity: f32,
    pub static_friction: f32,
    pub kinetic_friction: f32,
    pub continuous_collision: bool,
}

impl Default for MaterialDefinition {
    fn default() -> Self {
        Self {
            elasticity: 0.4,
            static_friction: 0.9,
            kinetic_friction: 0.5,
            continuous_collision: false,
        }
    }
}

impl MaterialDefinition {
    /// # Errors
    ///
    /// Returns [`PhysicsError::InvalidConfiguration`] for negative elasticity
    /// or friction outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if !(self.elasticity.is_finite() && self.elasticity >= 0.0) {
            return Err(PhysicsError::InvalidConfiguration(format!(
                "elasticity must be >= 0, got {}",
                self.elasticity
            )));
        }
        for (name, value) in [
            ("static friction", self.static_friction),
            ("kinetic friction", self.kinetic_friction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PhysicsError::InvalidConfiguration(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.elasticity > 1.0 {
            tracing::warn!(
                elasticity = self.elasticity,
                "material elasticity above 1 adds energy on impact"
            );
        }
        Ok(())
    }

    /// Properties of a contact between this material and `other`.
    #[must_use]
    pub fn combine(&self, other: &MaterialDefinition) -> PairProperties {
        PairProperties {
            collidable: true,
            softness: PAIR_SOFTNESS,
            elasticity: 0.5 * (self.elasticity + other.elasticity),
            static_friction: 0.5 * (self.static_friction + other.static_friction),
            kinetic_friction: 0.5 * (self.kinetic_friction + other.kinetic_friction),
            continuous: self.continuous_collision || other.continuous_collision,
        }
    }
}

/// Material definition with a lookup name, as loaded from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedMaterial {
    pub name: String,
    #[serde(flatten)]
    pub definition: MaterialDefinition,
}

#[derive(Debug, Clone)]
struct MaterialEntry {
    handle: MaterialHandle,
    definition: MaterialDefinition,
}

#[derive(Debug, Default)]
pub struct MaterialRegistry {
    entries: Vec<MaterialEntry>,
    by_handle: HashMap<MaterialHandle, MaterialId>,
    by_name: HashMap<String, MaterialId>,
}

impl MaterialRegistry {
    /// Registry holding only the solver's default material.
    ///
    /// # Errors
    ///
    /// Propagates solver failures while configuring the default pair.
    pub fn new(solver: &mut dyn NativeSolver) -> Result<Self> {
        let mut registry = Self::default();
        let definition = MaterialDefinition::default();
        let handle = solver.default_material();
        registry.insert(solver, handle, definition)?;
        Ok(registry)
    }

    /// # Errors
    ///
    /// Fails if the definition is invalid or the solver rejects a pair.
    pub fn add_material(
        &mut self,
        solver: &mut dyn NativeSolver,
        definition: MaterialDefinition,
    ) -> Result<MaterialId> {
        definition.validate()?;
        let handle = solver.create_material();
        self.insert(solver, handle, definition)
    }

    /// # Errors
    ///
    /// Fails like [`MaterialRegistry::add_material`], or with
    /// [`PhysicsError::InvalidConfiguration`] when the name is taken.
    pub fn add_named(
        &mut self,
        solver: &mut dyn NativeSolver,
        material: &NamedMaterial,
    ) -> Result<MaterialId> {
        if self.by_name.contains_key(&material.name) {
            return Err(PhysicsError::InvalidConfiguration(format!(
                "material '{}' is defined twice",
                material.name
            )));
        }
        let id = self.add_material(solver, material.definition)?;
        self.by_name.insert(material.name.clone(), id);
        Ok(id)
    }

    fn insert(
        &mut self,
        solver: &mut dyn NativeSolver,
        handle: MaterialHandle,
        definition: MaterialDefinition,
    ) -> Result<MaterialId> {
        #[allow(clippy::cast_possible_truncation)]
        let id = MaterialId(self.entries.len() as u32);
        self.entries.push(MaterialEntry { handle, definition });
        for entry in &self.entries {
            solver.set_material_pair(handle, entry.handle, definition.combine(&entry.definition))?;
        }
        self.by_handle.insert(handle, id);
        tracing::debug!(material = id.0, ?definition, "registered material");
        Ok(id)
    }

    fn entry(&self, id: MaterialId) -> Result<&MaterialEntry> {
        self.entries
            .get(id.0 as usize)
            .ok_or(PhysicsError::UnknownMaterial(id))
    }

    /// # Errors
    ///
    /// Returns [`PhysicsError::UnknownMaterial`] for ids this registry never issued.
    pub fn handle(&self, id: MaterialId) -> Result<MaterialHandle> {
        Ok(self.entry(id)?.handle)
    }

    /// # Errors
    ///
    /// Returns [`PhysicsError::UnknownMaterial`] for ids this registry never issued.
    pub fn definition(&self, id: MaterialId) -> Result<MaterialDefinition> {
        Ok(self.entry(id)?.definition)
    }

    #[must_use]
    pub fn id_for_handle(&self, handle: MaterialHandle) -> Option<MaterialId> {
        self.by_handle.get(&handle).copied()
    }

    #[must_use]
    pub fn named(&self, name: &str) -> Option<MaterialId> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// # Errors
    ///
    /// Fails for unknown materials or when the solver rejects the pair.
    pub fn pair(&self, solver: &dyn NativeSolver, a: MaterialId, b: MaterialId) -> Result<PairProperties> {
        Ok(solver.material_pair(self.handle(a)?, self.handle(b)?)?)
    }

    /// Overrides collidability of one pair, keeping its other properties.
    ///
    /// # Errors
    ///
    /// Fails for unknown materials or when the solver rejects the pair.
    pub fn set_collidable(
        &self,
        solver: &mut dyn NativeSolver,
        a: MaterialId,
        b: MaterialId,
        collidable: bool,
    ) -> Result<()> {
        let (ha, hb) = (self.handle(a)?, self.handle(b)?);
        let properties = PairProperties {
            collidable,
            ..solver.material_pair(ha, hb)?
        };
        solver.set_material_pair(ha, hb, properties)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solver::ReferenceSolver;

    #[test]
    fn pair_properties_are_averaged_and_ored() {
        let mut solver = ReferenceSolver::new();
        let mut registry = MaterialRegistry::new(&mut solver).unwrap();
        let rubber = registry
            .add_material(
                &mut solver,
                MaterialDefinition {
                    elasticity: 0.8,
                    static_friction: 1.0,
                    kinetic_friction: 0.7,
                    continuous_collision: true,
                },
            )
            .unwrap();

        let pair = registry.pair(&solver, MaterialId::DEFAULT, rubber).unwrap();
        assert!((pair.elasticity - 0.6).abs() < 1e-6);
        assert!((pair.static_friction - 0.95).abs() < 1e-6);
        assert!((pair.kinetic_friction - 0.6).abs() < 1e-6);
        assert!(pair.continuous);
        assert!((pair.softness - PAIR_SOFTNESS).abs() < f32::EPSILON);

        let own = registry.pair(&solver, rubber, rubber).unwrap();
        assert!((own.elasticity - 0.8).abs() < 1e-6);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn invalid_friction_is_rejected() {
        let mut solver = ReferenceSolver::new();
        let mut registry = MaterialRegistry::new(&mut solver).unwrap();
        let result = registry.add_material(
            &mut solver,
            MaterialDefinition {
                static_friction: 1.5,
                ..MaterialDefinition::default()
            },
        );
        assert!(matches!(result, Err(PhysicsError::InvalidConfiguration(_))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn collidable_override_keeps_other_properties() {
        let mut solver = ReferenceSolver::new();
        let registry = MaterialRegistry::new(&mut solver).unwrap();
        registry
            .set_collidable(&mut solver, MaterialId::DEFAULT, MaterialId::DEFAULT, false)
            .unwrap();
        let pair = registry
            .pair(&solver, MaterialId::DEFAULT, MaterialId::DEFAULT)
            .unwrap();
        assert!(!pair.collidable);
        assert!((pair.elasticity - 0.4).abs() < 1e-6);
    }

    #[test]
    fn named_materials_resolve_and_reject_duplicates() {
        let mut solver = ReferenceSolver::new();
        let mut registry = MaterialRegistry::new(&mut solver).unwrap();
        let ice = NamedMaterial {
            name: "ice".to_string(),
            definition: MaterialDefinition {
                static_friction: 0.1,
                kinetic_friction: 0.05,
                ..MaterialDefinition::default()
            },
        };
        let id = registry.add_named(&mut solver, &ice).unwrap();
        assert_eq!(registry.named("ice"), Some(id));
        assert!(registry.add_named(&mut solver, &ice).is_err());
    }
}
