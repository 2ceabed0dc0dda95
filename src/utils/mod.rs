//! The `utils` module provides definitions shared across the `topicbus`
//! application: the error types and the logging bootstrap.

pub mod error;
pub mod logging;

#[cfg(test)]
mod tests {
    use super::logging;

    #[test]
    fn logging_init_accepts_levels() {
        // Should not panic
        logging::init("info");
        logging::init("debug");
        logging::init("warn");
        logging::init("nonsense");
    }
}
