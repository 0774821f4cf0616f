/// Read-through caching around an async computation.
///
/// With `Some(cache)`, returns the cached value when present; otherwise runs the
/// block, queues the result for a background write and returns it. With `None`
/// the block just runs. A failing cache read is logged and treated as a miss, so
/// Redis trouble never fails a request.
///
/// # Arguments
/// * `$cache`: `Option<&dyn ResponseCache>`
/// * `$key`: the `CacheKey` to read and write
/// * `$ttl`: time-to-live in seconds
/// * `$block`: future producing `AppResult<T>`
///
/// # Example
/// ```rust,ignore
/// let movies = cached!(state.cache.as_deref(), key, 300, async move {
///     rank_titles(generation, tokens).await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        match $cache {
            Some(cache) => match cache.get_from_cache(&$key).await {
                Ok(Some(hit)) => {
                    tracing::debug!(key = %$key, "Cache hit");
                    Ok(hit)
                }
                miss => {
                    if let Err(e) = miss {
                        tracing::warn!(key = %$key, error = %e, "Cache read failed");
                    }
                    match $block.await {
                        Ok(value) => {
                            cache.set_in_background(&$key, &value, $ttl);
                            Ok(value)
                        }
                        Err(e) => Err(e),
                    }
                }
            },
            None => $block.await,
        }
    }};
}
