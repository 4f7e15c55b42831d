// distributor.rs — 按权重把一次抓取的总数分配给各来源

use crate::config::SourceConfig;
use crate::source::SourceKind;

/// 计算每个远程来源应请求的图片数
///
/// - 本地来源、未启用的来源、显式权重为 0 的来源不参与分配
/// - 所有候选来源都没有配置权重时，平均分配，余数给排在前面的来源
/// - 否则按 `round(weight / total_weight * total)` 分配，未配置权重的视为 0；
///   四舍五入造成的差额逐个补给仍低于应得份额的来源
///
/// 结果按 `sources` 的顺序排列，只包含分到图片的来源，总和恰好等于 `total`
pub fn distribute(total: usize, sources: &[SourceConfig]) -> Vec<(SourceKind, usize)> {
    let candidates: Vec<&SourceConfig> = sources
        .iter()
        .filter(|s| s.enabled && !s.kind.is_local() && s.weight != Some(0))
        .collect();
    if total == 0 || candidates.is_empty() {
        return Vec::new();
    }

    let total_weight: u64 = candidates.iter().filter_map(|s| s.weight).map(u64::from).sum();
    let counts = if total_weight == 0 {
        even_split(total, candidates.len())
    } else {
        let weights: Vec<u64> = candidates
            .iter()
            .map(|s| u64::from(s.weight.unwrap_or(0)))
            .collect();
        weighted_split(total, &weights, total_weight)
    };

    candidates
        .iter()
        .zip(counts)
        .filter(|(_, count)| *count > 0)
        .map(|(s, count)| (s.kind, count))
        .collect()
}

fn even_split(total: usize, n: usize) -> Vec<usize> {
    let base = total / n;
    let remainder = total % n;
    (0..n).map(|i| base + usize::from(i < remainder)).collect()
}

fn weighted_split(total: usize, weights: &[u64], total_weight: u64) -> Vec<usize> {
    let fair: Vec<f64> = weights
        .iter()
        .map(|w| *w as f64 / total_weight as f64 * total as f64)
        .collect();

    let mut allocated = 0usize;
    let mut counts: Vec<usize> = fair
        .iter()
        .map(|share| {
            let count = (share.round() as usize).min(total - allocated);
            allocated += count;
            count
        })
        .collect();

    // 先补给低于应得份额的来源，仍有剩余时按顺序补给有权重的来源
    while allocated < total {
        let below_fair = (0..counts.len()).find(|&i| weights[i] > 0 && (counts[i] as f64) < fair[i]);
        let target = below_fair
            .or_else(|| (0..counts.len()).find(|&i| weights[i] > 0))
            .unwrap_or(0);
        counts[target] += 1;
        allocated += 1;
    }
    counts
}

/// 本地来源应分到的图片数：`floor(w_local / Σw * total)`
///
/// Σw 为所有已启用来源（含本地）的权重之和；本地未启用或权重为 0 时返回 0
pub fn local_share(total: usize, sources: &[SourceConfig]) -> usize {
    let local_weight = sources
        .iter()
        .find(|s| s.kind.is_local() && s.enabled)
        .and_then(|s| s.weight)
        .map(u64::from)
        .unwrap_or(0);
    if local_weight == 0 {
        return 0;
    }
    let total_weight: u64 = sources
        .iter()
        .filter(|s| s.enabled)
        .filter_map(|s| s.weight)
        .map(u64::from)
        .sum();
    ((local_weight as f64 / total_weight as f64) * total as f64).floor() as usize
}

/// 本地来源已启用却没有配置权重，因此永远分不到图片
pub fn local_missing_weight(sources: &[SourceConfig]) -> bool {
    sources
        .iter()
        .any(|s| s.kind.is_local() && s.enabled && s.weight.is_none())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(kind: SourceKind, enabled: bool, weight: Option<u32>) -> SourceConfig {
        SourceConfig::new(kind, enabled, weight)
    }

    fn sum(result: &[(SourceKind, usize)]) -> usize {
        result.iter().map(|(_, n)| n).sum()
    }

    fn count_of(result: &[(SourceKind, usize)], kind: SourceKind) -> usize {
        result.iter().find(|(k, _)| *k == kind).map(|(_, n)| *n).unwrap_or(0)
    }

    #[test]
    fn equal_weights_break_ties_by_order() {
        let sources = [
            src(SourceKind::Unsplash, true, Some(50)),
            src(SourceKind::Pexels, true, Some(50)),
        ];
        let result = distribute(5, &sources);
        assert_eq!(result, vec![(SourceKind::Unsplash, 3), (SourceKind::Pexels, 2)]);
    }

    #[test]
    fn sums_to_total_for_many_shapes() {
        let weight_sets: [&[u32]; 6] = [
            &[1, 1, 1],
            &[33, 33, 34],
            &[70, 20, 10],
            &[1, 1000],
            &[5, 5, 5, 5, 5],
            &[3, 0, 7, 2],
        ];
        let kinds = [
            SourceKind::Unsplash,
            SourceKind::Wallhaven,
            SourceKind::Pexels,
            SourceKind::Pixabay,
            SourceKind::Picsum,
        ];
        for weights in weight_sets {
            let sources: Vec<SourceConfig> = weights
                .iter()
                .zip(kinds)
                .map(|(w, k)| src(k, true, Some(*w)))
                .collect();
            for total in 0..40 {
                let result = distribute(total, &sources);
                assert_eq!(sum(&result), total, "weights {weights:?} total {total}");
            }
        }
    }

    #[test]
    fn rounding_up_never_overshoots() {
        // 三个 0.5 份额都会向上取整，超出部分必须被截断
        let sources = [
            src(SourceKind::Unsplash, true, Some(1)),
            src(SourceKind::Wallhaven, true, Some(1)),
            src(SourceKind::Pexels, true, Some(1)),
            src(SourceKind::Pixabay, true, Some(1)),
        ];
        let result = distribute(2, &sources);
        assert_eq!(sum(&result), 2);
    }

    #[test]
    fn zero_weight_and_disabled_sources_get_nothing() {
        let sources = [
            src(SourceKind::Unsplash, true, Some(0)),
            src(SourceKind::Wallhaven, false, Some(100)),
            src(SourceKind::Pexels, true, Some(10)),
        ];
        let result = distribute(7, &sources);
        assert_eq!(result, vec![(SourceKind::Pexels, 7)]);
    }

    #[test]
    fn no_declared_weights_splits_evenly() {
        let sources = [
            src(SourceKind::Unsplash, true, None),
            src(SourceKind::Wallhaven, true, None),
            src(SourceKind::Picsum, true, None),
        ];
        let result = distribute(5, &sources);
        assert_eq!(
            result,
            vec![(SourceKind::Unsplash, 2), (SourceKind::Wallhaven, 2), (SourceKind::Picsum, 1)]
        );
    }

    #[test]
    fn undeclared_weight_counts_as_zero_once_others_declare() {
        let sources = [
            src(SourceKind::Unsplash, true, None),
            src(SourceKind::Pexels, true, Some(40)),
        ];
        let result = distribute(4, &sources);
        assert_eq!(result, vec![(SourceKind::Pexels, 4)]);
    }

    #[test]
    fn local_is_never_distributed() {
        let sources = [
            src(SourceKind::Local, true, Some(90)),
            src(SourceKind::Picsum, true, Some(10)),
        ];
        let result = distribute(3, &sources);
        assert_eq!(count_of(&result, SourceKind::Local), 0);
        assert_eq!(count_of(&result, SourceKind::Picsum), 3);
    }

    #[test]
    fn empty_cases() {
        assert!(distribute(0, &[src(SourceKind::Picsum, true, None)]).is_empty());
        assert!(distribute(5, &[]).is_empty());
        assert!(distribute(5, &[src(SourceKind::Picsum, false, None)]).is_empty());
    }

    #[test]
    fn local_share_floors_its_fraction() {
        let sources = [
            src(SourceKind::Local, true, Some(30)),
            src(SourceKind::Unsplash, true, Some(70)),
        ];
        assert_eq!(local_share(5, &sources), 1);
        assert_eq!(local_share(10, &sources), 3);

        let disabled = [
            src(SourceKind::Local, false, Some(30)),
            src(SourceKind::Unsplash, true, Some(70)),
        ];
        assert_eq!(local_share(10, &disabled), 0);
    }

    #[test]
    fn enabled_local_without_weight_is_reported() {
        let unweighted = [
            src(SourceKind::Local, true, None),
            src(SourceKind::Picsum, true, None),
        ];
        assert!(local_missing_weight(&unweighted));
        assert_eq!(local_share(5, &unweighted), 0);

        let weighted = [src(SourceKind::Local, true, Some(20))];
        assert!(!local_missing_weight(&weighted));
        let disabled = [src(SourceKind::Local, false, None)];
        assert!(!local_missing_weight(&disabled));
    }
}
