//! Mode-level parallelism with feature-gated implementations.
//!
//! The per-mode work inside one process (factorisations, intercepts, reconstruction) is
//! independent across modes. With the `rayon` feature it runs on the rayon pool; without
//! it the same helpers fall back to sequential iteration. Closures passed here must not
//! communicate: every message exchange happens between these calls, never inside them.

use crate::error::TriError;

/// Map over a slice of per-mode inputs
#[cfg(feature = "rayon")]
pub fn mode_map<T, U, F>(data: &[T], f: F) -> Vec<U>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> U + Sync + Send,
{
    use rayon::prelude::*;
    data.par_iter().map(f).collect()
}

/// Sequential map (fallback)
#[cfg(not(feature = "rayon"))]
pub fn mode_map<T, U, F>(data: &[T], f: F) -> Vec<U>
where
    F: Fn(&T) -> U,
{
    data.iter().map(f).collect()
}

/// Map over mode indices `0..count`
#[cfg(feature = "rayon")]
pub fn mode_map_indexed<U, F>(count: usize, f: F) -> Vec<U>
where
    U: Send,
    F: Fn(usize) -> U + Sync + Send,
{
    use rayon::prelude::*;
    (0..count).into_par_iter().map(f).collect()
}

/// Sequential indexed map (fallback)
#[cfg(not(feature = "rayon"))]
pub fn mode_map_indexed<U, F>(count: usize, f: F) -> Vec<U>
where
    F: Fn(usize) -> U,
{
    (0..count).map(f).collect()
}

/// Fallible per-mode map; the first error (in mode order) wins.
pub fn try_mode_map<T, U, F>(data: &[T], f: F) -> Result<Vec<U>, TriError>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> Result<U, TriError> + Sync + Send,
{
    mode_map(data, f).into_iter().collect()
}

/// Optional dedicated pool for the per-mode work of one solver.
pub struct ModePool {
    #[cfg(feature = "rayon")]
    pool: Option<rayon::ThreadPool>,
}

impl ModePool {
    /// `None` uses the global pool; `Some(0)` sizes a dedicated pool with `num_cpus`.
    #[cfg(feature = "rayon")]
    pub fn new(threads: Option<usize>) -> Result<Self, TriError> {
        let pool = match threads {
            None => None,
            Some(n) => {
                let n = if n == 0 { num_cpus::get() } else { n };
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| TriError::InvalidOption { key: "threads".into(), reason: e.to_string() })?;
                Some(pool)
            }
        };
        Ok(ModePool { pool })
    }

    #[cfg(not(feature = "rayon"))]
    pub fn new(_threads: Option<usize>) -> Result<Self, TriError> {
        Ok(ModePool {})
    }

    /// Run `f` with this pool as the current rayon pool.
    pub fn install<R, F>(&self, f: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        #[cfg(feature = "rayon")]
        {
            match &self.pool {
                Some(pool) => pool.install(f),
                None => f(),
            }
        }
        #[cfg(not(feature = "rayon"))]
        {
            f()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_preserve_mode_order() {
        let v: Vec<usize> = (0..64).collect();
        assert_eq!(mode_map(&v, |x| x * 2), (0..64).map(|x| x * 2).collect::<Vec<_>>());
        assert_eq!(mode_map_indexed(5, |k| k + 1), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn first_error_in_mode_order_wins() {
        let v = [0usize, 1, 2, 3];
        let res = try_mode_map(&v, |&k| if k >= 2 { Err(TriError::ZeroPivot(k)) } else { Ok(k) });
        assert_eq!(res, Err(TriError::ZeroPivot(2)));
    }

    #[test]
    fn dedicated_pool_runs_work() {
        let pool = ModePool::new(Some(2)).unwrap();
        let sum: usize = pool.install(|| mode_map_indexed(10, |k| k).into_iter().sum());
        assert_eq!(sum, 45);
    }
}
