//! Per-frame uniform data.

use bytemuck::{Pod, Zeroable};

/// Simulation parameters written to each slot's uniform buffer every frame.
///
/// Layout matches the std140 uniform block in the compute shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SimParams {
    /// Time since the previous frame, in milliseconds.
    pub delta_time: f32,
}

impl SimParams {
    /// Size of the uniform block in bytes.
    pub const SIZE: u64 = std::mem::size_of::<SimParams>() as u64;

    /// Returns the raw bytes for a buffer write.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_params_layout() {
        assert_eq!(SimParams::SIZE, 4);
        assert_eq!(
            SimParams { delta_time: 1.5 }.as_bytes(),
            &1.5f32.to_le_bytes()
        );
    }
}
