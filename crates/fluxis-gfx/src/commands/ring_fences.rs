use crate::commands::fence::GfxFence;

/// 循环使用固定数量的 fence，限制 CPU 录制最多领先 GPU `RING_SIZE` 个迭代
///
/// 典型用法：每个迭代开始时调用 [`Self::next_cycle_wait_and_get`]，
/// 等待该槽位上一轮的 GPU 工作完成后，才能复用这一槽位的资源。
pub struct GfxRingFences {
    ring: [GfxFence; Self::RING_SIZE],
    current_index: usize,
}

// new & destroy
impl GfxRingFences {
    /// CPU 与 GPU 之间允许重叠的迭代数
    pub const RING_SIZE: usize = 2;

    pub fn new(debug_name: &str) -> Self {
        let ring =
            std::array::from_fn(|idx| GfxFence::new(true, &format!("{}-ring-{}", debug_name, idx)));
        Self {
            ring,
            current_index: 0,
        }
    }

    pub fn destroy(self) {
        for fence in self.ring {
            fence.destroy();
        }
    }
}

// update
impl GfxRingFences {
    /// 每个迭代调用一次；等待目标槽位空闲，将其 fence 重置后返回
    ///
    /// 返回的 fence 应该交给本迭代的 submit
    pub fn next_cycle_wait_and_get(&mut self) -> &GfxFence {
        self.set_cycle_wait_and_get(self.current_index + 1)
    }

    /// 等待指定 cycle（可以是绝对迭代序号）可用
    pub fn set_cycle_wait_and_get(&mut self, cycle: usize) -> &GfxFence {
        self.current_index = cycle % Self::RING_SIZE;
        let fence = &self.ring[self.current_index];
        fence.wait();
        fence.reset();
        fence
    }
}

// getters
impl GfxRingFences {
    #[inline]
    pub fn current_cycle_index(&self) -> usize {
        self.current_index
    }

    #[inline]
    pub const fn ring_size() -> usize {
        Self::RING_SIZE
    }
}
