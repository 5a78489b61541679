//! 显存别名的生命周期区间分析
//!
//! 非持久、无延迟的资源在一次迭代内的活跃区间是
//! [生产者的拓扑位置, 最后一个消费者的拓扑位置]。
//! 区间互不交叠的资源可以共用同一块显存：它们的 pre/post 使用
//! 区间在拓扑顺序上互斥，这是编译期性质，不需要运行时锁。

/// 一份资源在拓扑顺序上的活跃区间（闭区间）
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct FgAliasInterval {
    /// 资源在 spec 列表中的下标
    pub resource: usize,
    pub start: usize,
    pub end: usize,
}

impl FgAliasInterval {
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// 把区间做 first-fit 装箱，返回资源下标的分组
///
/// 只返回成员数 ≥ 2 的组；独占显存的资源不需要别名堆。
pub(crate) fn pack_intervals(intervals: &[FgAliasInterval]) -> Vec<Vec<usize>> {
    // 按起点排序之后 first-fit，组内保持互不交叠
    let mut sorted = intervals.to_vec();
    sorted.sort_by_key(|interval| (interval.start, interval.end));

    let mut groups: Vec<Vec<FgAliasInterval>> = Vec::new();
    for interval in sorted {
        match groups.iter_mut().find(|group| group.iter().all(|member| !member.overlaps(&interval))) {
            Some(group) => group.push(interval),
            None => groups.push(vec![interval]),
        }
    }

    groups
        .into_iter()
        .filter(|group| group.len() >= 2)
        .map(|group| group.into_iter().map(|interval| interval.resource).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(resource: usize, start: usize, end: usize) -> FgAliasInterval {
        FgAliasInterval { resource, start, end }
    }

    #[test]
    fn test_disjoint_intervals_share_memory() {
        let groups = pack_intervals(&[interval(0, 0, 1), interval(1, 2, 3)]);
        assert_eq!(groups, vec![vec![0, 1]]);
    }

    #[test]
    fn test_overlapping_intervals_do_not_share() {
        let groups = pack_intervals(&[interval(0, 0, 2), interval(1, 1, 3)]);
        assert!(groups.is_empty());
    }

    #[test]
    fn test_touching_intervals_do_not_share() {
        // 闭区间：末尾位置相同意味着同一个节点在用两份资源
        let groups = pack_intervals(&[interval(0, 0, 1), interval(1, 1, 2)]);
        assert!(groups.is_empty());
    }

    #[test]
    fn test_chain_packs_alternating() {
        // 链式流水线上间隔一个阶段的资源可以复用
        let groups = pack_intervals(&[
            interval(0, 0, 1),
            interval(1, 1, 2),
            interval(2, 2, 3),
            interval(3, 3, 4),
        ]);
        assert_eq!(groups, vec![vec![0, 2], vec![1, 3]]);
    }

    #[test]
    fn test_single_member_groups_dropped() {
        let groups = pack_intervals(&[interval(0, 0, 5)]);
        assert!(groups.is_empty());
    }
}
