/// Result of [`filter_with_fallback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Narrowed<T> {
    pub items: Vec<T>,
    /// The filter matched nothing and the unfiltered input was returned.
    pub widened: bool,
}

/// Keep the items matching `keep`; if none match, keep everything.
///
/// Every "pool would be empty" case in selection goes through here, so an empty
/// result is only possible when the input itself is empty.
pub fn filter_with_fallback<T, F>(items: &[T], mut keep: F) -> Narrowed<T>
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    let filtered: Vec<T> = items.iter().filter(|item| keep(item)).cloned().collect();
    if filtered.is_empty() {
        Narrowed { items: items.to_vec(), widened: true }
    } else {
        Narrowed { items: filtered, widened: false }
    }
}
