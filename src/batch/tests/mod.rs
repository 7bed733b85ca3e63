mod helpers;

mod tests_get;

// Priority 3 — the sharpest edge cases live in the composite iterator
mod tests_iterator;
