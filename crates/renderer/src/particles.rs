//! Particle state and initial seeding.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec4};
use nebula_rhi::vk;
use rand::Rng;

/// Number of simulated particles.
pub const PARTICLE_COUNT: u32 = 8192;

/// One particle as laid out in the storage buffer.
///
/// The same layout is consumed twice: the compute shader reads and writes it
/// through the storage buffer bindings, and the vertex shader reads position
/// and color straight out of the same buffer bound as a vertex buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Particle {
    /// Position in normalized device coordinates.
    pub position: Vec2,
    /// Velocity in NDC units per millisecond.
    pub velocity: Vec2,
    /// Particle color (RGBA).
    pub color: Vec4,
}

impl Particle {
    /// Vertex binding description for the particle buffer.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(std::mem::size_of::<Particle>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
    }

    /// Vertex attribute descriptions: position at location 0, color at
    /// location 1. Velocity is compute-only and skipped.
    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(0)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(std::mem::offset_of!(Particle, position) as u32),
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(1)
                .format(vk::Format::R32G32B32A32_SFLOAT)
                .offset(std::mem::offset_of!(Particle, color) as u32),
        ]
    }
}

/// Seeds `count` particles on a disc around the origin, each drifting
/// outward from the center.
///
/// `aspect` (height / width) squashes the disc horizontally so it appears
/// circular on screen.
pub fn seed_particles(count: u32, aspect: f32) -> Vec<Particle> {
    seed_particles_with(&mut rand::thread_rng(), count, aspect)
}

/// Seeds particles from a caller-provided random source.
pub fn seed_particles_with<R: Rng>(rng: &mut R, count: u32, aspect: f32) -> Vec<Particle> {
    (0..count)
        .map(|_| {
            let radius = 0.25 * rng.gen::<f32>().sqrt();
            let theta = rng.gen::<f32>() * 2.0 * std::f32::consts::PI;
            let position = Vec2::new(radius * theta.cos() * aspect, radius * theta.sin());

            Particle {
                position,
                velocity: position.normalize_or_zero() * 0.00025,
                color: Vec4::new(rng.gen::<f32>(), rng.gen::<f32>(), rng.gen::<f32>(), 1.0),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_particle_layout() {
        assert_eq!(std::mem::size_of::<Particle>(), 32);
        assert_eq!(std::mem::offset_of!(Particle, position), 0);
        assert_eq!(std::mem::offset_of!(Particle, velocity), 8);
        assert_eq!(std::mem::offset_of!(Particle, color), 16);
    }

    #[test]
    fn test_attribute_descriptions_skip_velocity() {
        let attrs = Particle::attribute_descriptions();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[0].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attrs[1].offset, 16);
        assert_eq!(attrs[1].format, vk::Format::R32G32B32A32_SFLOAT);
    }

    #[test]
    fn test_binding_stride_matches_struct() {
        assert_eq!(
            Particle::binding_description().stride as usize,
            std::mem::size_of::<Particle>()
        );
    }

    #[test]
    fn test_seeding_stays_on_disc() {
        let mut rng = StdRng::seed_from_u64(42);
        let particles = seed_particles_with(&mut rng, 1000, 600.0 / 800.0);

        assert_eq!(particles.len(), 1000);
        for p in &particles {
            // Undo the aspect squash before checking the radius
            let unsquashed = Vec2::new(p.position.x / (600.0 / 800.0), p.position.y);
            assert!(unsquashed.length() <= 0.25 + 1e-5);
            assert_eq!(p.color.w, 1.0);
            assert!(p.velocity.length() <= 0.00025 + 1e-7);
        }
    }

    #[test]
    fn test_seeding_is_deterministic_for_a_seed() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        assert_eq!(
            seed_particles_with(&mut a, 16, 1.0),
            seed_particles_with(&mut b, 16, 1.0)
        );
    }
}
