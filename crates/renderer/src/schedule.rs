//! Frame scheduling decisions.
//!
//! The per-frame control flow lives here as pure functions over the
//! swapchain outcomes, so the drop/recreate/present decisions can be tested
//! without a GPU. The orchestrator in [`crate::renderer`] executes what
//! these functions decide.

use nebula_rhi::swapchain::{ImageAcquire, PresentOutcome};
use nebula_rhi::vk;

/// Maps a frame index onto its slot in the frame ring.
pub fn slot_index(frame_index: u64, slot_count: usize) -> usize {
    (frame_index % slot_count as u64) as usize
}

/// What to do with the current frame after image acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquirePlan {
    /// Render and present the acquired image.
    Render {
        /// Index of the acquired swapchain image.
        image_index: u32,
        /// The swapchain is suboptimal; recreate after presenting.
        suboptimal: bool,
    },
    /// Drop this frame entirely and recreate the swapchain. Nothing was
    /// acquired, so no submit or present may happen this iteration.
    SkipAndRecreate,
}

/// Decides the frame's fate from the acquisition outcome.
pub fn plan_acquire(outcome: ImageAcquire) -> AcquirePlan {
    match outcome {
        ImageAcquire::Acquired { index, suboptimal } => AcquirePlan::Render {
            image_index: index,
            suboptimal,
        },
        ImageAcquire::Stale => AcquirePlan::SkipAndRecreate,
    }
}

/// Whether the swapchain must be recreated after a completed present.
///
/// Any of a stale or suboptimal outcome, a suboptimal acquisition earlier in
/// the frame, or an external resize notification forces recreation.
pub fn should_recreate_after_present(
    outcome: PresentOutcome,
    acquired_suboptimal: bool,
    resize_requested: bool,
) -> bool {
    match outcome {
        PresentOutcome::Stale | PresentOutcome::Suboptimal => true,
        PresentOutcome::Ok => acquired_suboptimal || resize_requested,
    }
}

/// Whether the surface extent permits rendering at all.
///
/// A minimized window reports (0,0); frames and swapchain recreation are
/// deferred until the extent is non-zero again.
pub fn extent_is_renderable(width: u32, height: u32) -> bool {
    width > 0 && height > 0
}

/// Whether the compute stage may submit this iteration.
///
/// A binary semaphore signal must be consumed exactly once. When a frame was
/// dropped after its compute submission (stale acquisition), the slot's
/// compute-finished signal is still pending; the next use of that slot skips
/// the compute stage and lets the graphics submission consume the pending
/// signal instead of signaling on top of it.
pub fn run_compute_stage(compute_signal_pending: bool) -> bool {
    !compute_signal_pending
}

/// Number of workgroups needed to cover `item_count` items.
pub fn dispatch_group_count(item_count: u32, local_size: u32) -> u32 {
    item_count.div_ceil(local_size)
}

/// Wait semaphores and matching stage masks for the graphics submission.
///
/// The compute-finished wait gates vertex input, because the compute output
/// is read as vertex data; the image-available wait only gates color output,
/// so rasterization can start before the target image is ready.
pub fn graphics_wait_info(
    compute_finished: vk::Semaphore,
    image_available: vk::Semaphore,
) -> ([vk::Semaphore; 2], [vk::PipelineStageFlags; 2]) {
    (
        [compute_finished, image_available],
        [
            vk::PipelineStageFlags::VERTEX_INPUT,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_index_wraps() {
        assert_eq!(slot_index(0, 2), 0);
        assert_eq!(slot_index(1, 2), 1);
        assert_eq!(slot_index(2, 2), 0);
        assert_eq!(slot_index(7, 3), 1);
    }

    #[test]
    fn test_ten_frames_use_each_slot_five_times() {
        let mut uses = [0u32; 2];
        for frame in 0..10u64 {
            uses[slot_index(frame, 2)] += 1;
        }
        assert_eq!(uses, [5, 5]);
    }

    #[test]
    fn test_stale_acquire_drops_the_frame() {
        assert_eq!(
            plan_acquire(ImageAcquire::Stale),
            AcquirePlan::SkipAndRecreate
        );
    }

    #[test]
    fn test_suboptimal_acquire_still_renders() {
        let plan = plan_acquire(ImageAcquire::Acquired {
            index: 1,
            suboptimal: true,
        });
        assert_eq!(
            plan,
            AcquirePlan::Render {
                image_index: 1,
                suboptimal: true,
            }
        );
    }

    #[test]
    fn test_recreate_after_present() {
        assert!(!should_recreate_after_present(PresentOutcome::Ok, false, false));
        assert!(should_recreate_after_present(PresentOutcome::Stale, false, false));
        assert!(should_recreate_after_present(PresentOutcome::Suboptimal, false, false));
        assert!(should_recreate_after_present(PresentOutcome::Ok, true, false));
        assert!(should_recreate_after_present(PresentOutcome::Ok, false, true));
    }

    #[test]
    fn test_zero_extent_defers_rendering() {
        assert!(!extent_is_renderable(0, 0));
        assert!(!extent_is_renderable(800, 0));
        assert!(!extent_is_renderable(0, 600));
        assert!(extent_is_renderable(1, 1));
    }

    #[test]
    fn test_compute_stage_skipped_while_signal_pending() {
        assert!(run_compute_stage(false));
        assert!(!run_compute_stage(true));
    }

    #[test]
    fn test_dispatch_group_count_covers_all_items() {
        assert_eq!(dispatch_group_count(256, 256), 1);
        assert_eq!(dispatch_group_count(257, 256), 2);
        assert_eq!(dispatch_group_count(8192, 256), 32);
        assert_eq!(dispatch_group_count(1, 256), 1);
    }

    // Replays the orchestrator's per-frame control flow over these decision
    // functions, with a stale acquisition injected partway through. The
    // dropped iteration must not present or advance the frame index, must
    // trigger exactly one recreation, and must leave its slot's pending
    // compute signal to be consumed on the retry.
    #[test]
    fn test_frame_sequence_with_stale_acquire_mid_run() {
        const STALE_ITERATION: usize = 4;

        let mut frame_index = 0u64;
        let mut signal_pending = [false; 2];
        let mut presents = 0u32;
        let mut recreates = 0u32;
        let mut compute_submits = 0u32;
        let mut slot_of_retry = None;

        for iteration in 0.. {
            if presents == 10 {
                break;
            }
            let s = slot_index(frame_index, 2);

            if run_compute_stage(signal_pending[s]) {
                compute_submits += 1;
                signal_pending[s] = true;
            } else {
                slot_of_retry = Some(s);
            }

            let outcome = if iteration == STALE_ITERATION {
                ImageAcquire::Stale
            } else {
                ImageAcquire::Acquired {
                    index: (iteration % 3) as u32,
                    suboptimal: false,
                }
            };
            match plan_acquire(outcome) {
                AcquirePlan::SkipAndRecreate => {
                    recreates += 1;
                    continue;
                }
                AcquirePlan::Render { .. } => {}
            }

            // Graphics submission consumes the slot's compute signal
            signal_pending[s] = false;
            presents += 1;

            if should_recreate_after_present(PresentOutcome::Ok, false, false) {
                recreates += 1;
            }
            frame_index += 1;
        }

        assert_eq!(presents, 10);
        assert_eq!(recreates, 1);
        assert_eq!(frame_index, 10);
        // The dropped iteration retried on the same slot without a second
        // compute submission, so its leftover signal was consumed once
        assert_eq!(compute_submits, 10);
        assert_eq!(slot_of_retry, Some(slot_index(STALE_ITERATION as u64, 2)));
    }

    #[test]
    fn test_graphics_wait_stage_pairing() {
        use nebula_rhi::vk::Handle;

        let compute = vk::Semaphore::from_raw(1);
        let image = vk::Semaphore::from_raw(2);
        let (semaphores, stages) = graphics_wait_info(compute, image);

        // Compute output is consumed at vertex input, the swapchain image
        // only at color output
        assert_eq!(semaphores[0], compute);
        assert_eq!(stages[0], vk::PipelineStageFlags::VERTEX_INPUT);
        assert_eq!(semaphores[1], image);
        assert_eq!(stages[1], vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
    }
}
