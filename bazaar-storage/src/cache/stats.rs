use serde::Serialize;

/// Counters for a [`super::ShopCache`], taken at one instant.
///
/// `misses` includes lookups that found an expired entry; those are also
/// counted under `expirations`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Shops pushed out by the capacity bound.
    pub evictions: u64,
    /// Shops dropped on read after their TTL ran out.
    pub expirations: u64,
    /// Shops held when the snapshot was taken.
    pub entry_count: u64,
}

impl CacheStats {
    /// Total `get` calls observed.
    pub fn lookups(&self) -> u64 {
        self.hits.saturating_add(self.misses)
    }

    /// Fraction of lookups served from the cache; zero before any lookup.
    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            lookups => self.hits as f64 / lookups as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_over_lookups() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            expirations: 1,
            ..CacheStats::default()
        };
        assert_eq!(stats.lookups(), 4);
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_hit_rate_without_lookups_is_zero() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
