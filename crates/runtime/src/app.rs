//! # Sandbox
//!
//! A headless scene runner: loads a [`WorldConfig`], drops a pile of random
//! bodies onto a static floor and steps the world a fixed number of frames.

use std::cell::Cell;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use glam::Vec3;
use physics::{
    BodyDescription, BodyId, CollisionHook, ContactResponse, MaterialId, PhysicsWorld,
    WorldConfig,
};

/// Bodies that fall this far below the floor are removed from the world.
const KILL_DEPTH: f32 = -50.0;
const FLOOR_HALF_EXTENTS: Vec3 = Vec3::new(20.0, 0.5, 20.0);
const SPAWN_HEIGHT: (f32, f32) = (2.0, 12.0);
const SPAWN_SPREAD: f32 = 8.0;

/// Reads a world description from JSON, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<WorldConfig> {
    let Some(path) = path else {
        return Ok(WorldConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: WorldConfig = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    Ok(config)
}

/// How the frame loop moves simulated time forward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    /// Hands the world exactly this many seconds per frame.
    Fixed(f32),
    /// Sleeps for the period and lets the world read its own clock.
    Realtime(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    pub frames: u64,
    pub alive: usize,
    pub removed: usize,
    pub contacts_started: usize,
    /// Lowest body centre seen at the end of the run.
    pub lowest: Option<f32>,
}

pub struct Sandbox {
    world: PhysicsWorld,
    floor: BodyId,
    removed: usize,
    contacts_started: Rc<Cell<usize>>,
}

impl Sandbox {
    pub fn new(config: &WorldConfig, bodies: usize, seed: u64) -> Result<Self> {
        let mut world = PhysicsWorld::new(config).context("Failed to create physics world")?;
        let floor = Self::populate(&mut world, bodies, seed)?;

        let contacts_started = Rc::new(Cell::new(0));
        let counter = Rc::clone(&contacts_started);
        world.register_collision_hook(
            MaterialId::DEFAULT,
            MaterialId::DEFAULT,
            CollisionHook::new().on_start(move |_| {
                counter.set(counter.get() + 1);
                ContactResponse::Allow
            }),
        )?;
        world.on_stepped(|event| {
            if event.frame % 60 == 0 {
                tracing::debug!(frame = event.frame, substeps = event.substeps, "stepped");
            }
        });
        world.unpause();

        Ok(Self {
            world,
            floor,
            removed: 0,
            contacts_started,
        })
    }

    fn populate(world: &mut PhysicsWorld, bodies: usize, seed: u64) -> Result<BodyId> {
        let floor = world.add_body(
            &BodyDescription::cuboid(FLOOR_HALF_EXTENTS)
                .with_mass(0.0)
                .at(Vec3::new(0.0, -FLOOR_HALF_EXTENTS.y, 0.0)),
        )?;

        let mut rng = fastrand::Rng::with_seed(seed);
        let spread = |rng: &mut fastrand::Rng| (rng.f32() * 2.0 - 1.0) * SPAWN_SPREAD;
        for index in 0..bodies {
            let position = Vec3::new(
                spread(&mut rng),
                SPAWN_HEIGHT.0 + rng.f32() * (SPAWN_HEIGHT.1 - SPAWN_HEIGHT.0),
                spread(&mut rng),
            );
            let description = if rng.bool() {
                BodyDescription::sphere(0.25 + rng.f32() * 0.5)
            } else {
                BodyDescription::cuboid(Vec3::splat(0.25 + rng.f32() * 0.5))
            };
            world.add_body(
                &description
                    .at(position)
                    .with_mass(0.5 + rng.f32() * 2.0)
                    .with_user_data(index as u64),
            )?;
        }
        tracing::info!(bodies, seed, "scene populated");
        Ok(floor)
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    /// Advances one frame and culls bodies that fell out.
    pub fn frame(&mut self, pacing: Pacing) -> Result<()> {
        match pacing {
            Pacing::Fixed(dt) => self.world.advance(dt)?,
            Pacing::Realtime(period) => {
                thread::sleep(period);
                self.world.update()?
            }
        };
        for id in self.world.body_ids() {
            if id == self.floor || self.world.is_removal_pending(id)? {
                continue;
            }
            if self.world.body(id)?.position().y < KILL_DEPTH {
                tracing::debug!(body = ?id, "body left the scene");
                self.world.remove_body(id)?;
                self.removed += 1;
            }
        }
        Ok(())
    }

    pub fn run(&mut self, frames: u64, pacing: Pacing) -> Result<Report> {
        for frame in 0..frames {
            self.frame(pacing)
                .with_context(|| format!("Simulation failed on frame {frame}"))?;
            if frame % 120 == 0 {
                tracing::info!(
                    frame,
                    bodies = self.world.body_count(),
                    contacts = self.contacts_started.get(),
                    "progress"
                );
            }
        }
        self.report()
    }

    pub fn report(&self) -> Result<Report> {
        let mut lowest: Option<f32> = None;
        let mut alive = 0;
        for id in self.world.body_ids() {
            if id == self.floor || self.world.is_removal_pending(id)? {
                continue;
            }
            alive += 1;
            let y = self.world.body(id)?.position().y;
            lowest = Some(lowest.map_or(y, |low| low.min(y)));
        }
        Ok(Report {
            frames: self.world.frame(),
            alive,
            removed: self.removed,
            contacts_started: self.contacts_started.get(),
            lowest,
        })
    }

    pub fn shutdown(mut self) -> Result<()> {
        self.world.dispose()?;
        Ok(())
    }
}
