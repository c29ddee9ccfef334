//! The demo scene: a handful of spinning objects around the focal plane.
//!
//! The set is chosen so every branch of the quilt passes has something to
//! do: opaque and transparent queues, a material without instancing (drawn by
//! the multi-pass renderer only) and an object whose shader has no usable
//! pass (drawn by the error fallback).

use crate::data::MeshKind;
use glam::{EulerRot, Mat4, Quat, Vec3};
use lenticular::backend::{MaterialId, MaterialInfo, MeshId, RendererEntry};

pub const QUEUE_OPAQUE: u32 = 2000;
pub const QUEUE_TRANSPARENT: u32 = 3000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneObject {
    pub name: &'static str,
    pub mesh: MeshKind,
    pub world: Mat4,
    pub color: [f32; 4],
    /// Render queue; values above 2500 are blended.
    pub queue: u32,
    /// Whether the object's shader has a pass the renderer can draw.
    pub shader: bool,
    pub material: MaterialInfo,
}

impl SceneObject {
    pub fn entry(&self) -> RendererEntry {
        RendererEntry {
            mesh: Some(MeshId(self.mesh.id())),
            material: self.shader.then_some(self.material),
            world: self.world,
            queue: self.queue,
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.queue > lenticular::backend::RenderQueueRange::OPAQUE.upper
    }
}

#[derive(Debug, Clone, Copy)]
struct Pose {
    translation: Vec3,
    scale: Vec3,
    tilt: Quat,
    spins: bool,
}

impl Pose {
    fn world(&self, angle_deg: f32) -> Mat4 {
        let spin = if self.spins {
            Quat::from_rotation_z(angle_deg.to_radians())
        } else {
            Quat::IDENTITY
        };
        Mat4::from_scale_rotation_translation(self.scale, spin * self.tilt, self.translation)
    }
}

pub struct DemoScene {
    objects: Vec<SceneObject>,
    poses: Vec<Pose>,
    /// Degrees per second about the view axis.
    pub rotation_speed: f32,
    angle: f32,
}

impl DemoScene {
    pub fn new(rotation_speed: f32) -> Self {
        let tilt = Quat::from_euler(EulerRot::XYZ, 0.5, 0.6, 0.0);
        #[rustfmt::skip]
        let layout = [
            // name, mesh, translation, scale, color, queue, shader, instancing, spins
            ("backdrop", MeshKind::Plane,      Vec3::new(0.0, 0.0, -1.5),  Vec3::new(4.0, 2.6, 1.0), [0.10, 0.14, 0.28, 1.0],  QUEUE_OPAQUE,      true,  true,  false),
            ("cube",     MeshKind::Cube,       Vec3::new(-1.0, 0.35, 0.0), Vec3::splat(0.7),         [0.95, 0.55, 0.15, 1.0],  QUEUE_OPAQUE,      true,  true,  true),
            ("glass",    MeshKind::Cube,       Vec3::new(0.9, -0.2, 0.7),  Vec3::splat(0.55),        [0.30, 0.85, 0.95, 0.45], QUEUE_TRANSPARENT, true,  true,  true),
            ("gem",      MeshKind::Octahedron, Vec3::new(0.3, 0.9, -0.7),  Vec3::splat(0.6),         [0.45, 0.90, 0.40, 1.0],  QUEUE_OPAQUE,      true,  false, true),
            ("broken",   MeshKind::Cube,       Vec3::new(0.0, -1.1, 0.3),  Vec3::splat(0.35),        [1.0, 1.0, 1.0, 1.0],     QUEUE_OPAQUE,      false, true,  true),
        ];

        let mut objects = Vec::with_capacity(layout.len());
        let mut poses = Vec::with_capacity(layout.len());
        for (index, (name, mesh, translation, scale, color, queue, shader, instancing, spins)) in
            layout.into_iter().enumerate()
        {
            let pose = Pose {
                translation,
                scale,
                tilt: if spins { tilt } else { Quat::IDENTITY },
                spins,
            };
            objects.push(SceneObject {
                name,
                mesh,
                world: pose.world(0.0),
                color,
                queue,
                shader,
                material: MaterialInfo {
                    id: MaterialId(index as u32),
                    enable_instancing: instancing,
                },
            });
            poses.push(pose);
        }

        Self {
            objects,
            poses,
            rotation_speed,
            angle: 0.0,
        }
    }

    /// Advances the spin by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        self.angle = (self.angle + self.rotation_speed * dt).rem_euclid(360.0);
        for (object, pose) in self.objects.iter_mut().zip(&self.poses) {
            object.world = pose.world(self.angle);
        }
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_spinning_objects_move() {
        let mut scene = DemoScene::new(360.0);
        let before: Vec<_> = scene.objects().iter().map(|o| o.world).collect();
        scene.update(0.25);
        assert!((scene.angle() - 90.0).abs() < 1e-4);

        for (object, old) in scene.objects().iter().zip(before) {
            if object.name == "backdrop" {
                assert_eq!(object.world, old);
            } else {
                assert_ne!(object.world, old, "{} did not move", object.name);
                // Spinning about the view axis keeps the object in place.
                assert_eq!(object.world.w_axis, old.w_axis);
            }
        }
    }

    #[test]
    fn full_turn_wraps_around() {
        let mut scene = DemoScene::new(360.0);
        let start = scene.objects()[1].world;
        scene.update(1.0);
        assert!(scene.angle().abs() < 1e-4);
        assert!(scene.objects()[1].world.abs_diff_eq(start, 1e-5));
    }

    #[test]
    fn entries_cover_every_filtering_case() {
        let scene = DemoScene::new(0.0);
        let entries: Vec<_> = scene.objects().iter().map(SceneObject::entry).collect();
        assert_eq!(entries.len(), 5);

        let instanceable = entries
            .iter()
            .filter(|e| e.mesh.is_some() && e.material.is_some_and(|m| m.enable_instancing))
            .count();
        assert_eq!(instanceable, 3);

        let broken = scene.objects().iter().position(|o| o.name == "broken").unwrap();
        assert!(entries[broken].material.is_none());
        let glass = scene.objects().iter().position(|o| o.name == "glass").unwrap();
        assert!(scene.objects()[glass].is_transparent());
        assert_eq!(entries[glass].queue, QUEUE_TRANSPARENT);
    }
}
