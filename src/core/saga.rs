use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

/// A durable, correlation-addressed state instance.
///
/// The correlation id is assigned once, before the instance is first handed
/// to a repository context, and never changes afterwards.
pub trait Saga: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn correlation_id(&self) -> Uuid;

    /// Short label used in log fields and as the default table partition.
    fn saga_type() -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// Last path segment of a type name, without generic arguments.
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// A saga carrying an optimistic concurrency token.
///
/// Backends own the token: `insert`/`add` set it to 1 and every successful
/// `update` increments it. Behavior code should only read it.
pub trait VersionedSaga: Saga {
    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct OrderState {
        id: Uuid,
    }

    impl Saga for OrderState {
        fn correlation_id(&self) -> Uuid {
            self.id
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Tracked<T> {
        id: Uuid,
        inner: T,
    }

    impl<T> Saga for Tracked<T>
    where
        T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        fn correlation_id(&self) -> Uuid {
            self.id
        }
    }

    #[test]
    fn saga_type_strips_module_path() {
        assert_eq!(OrderState::saga_type(), "OrderState");
    }

    #[test]
    fn saga_type_drops_generic_arguments() {
        assert_eq!(Tracked::<OrderState>::saga_type(), "Tracked");
        assert_eq!(Tracked::<Vec<std::string::String>>::saga_type(), "Tracked");
    }

    #[test]
    fn short_type_name_handles_plain_and_nested_paths() {
        assert_eq!(short_type_name("u32"), "u32");
        assert_eq!(short_type_name("app::orders::Submit"), "Submit");
        assert_eq!(short_type_name("app::Envelope<billing::Invoice>"), "Envelope");
    }
}
