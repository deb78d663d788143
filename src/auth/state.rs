//! Authentication state trait and macro.

use crate::policy::JwtPolicy;

/// Trait for state types that give extractors access to the policy.
pub trait HasJwtPolicy {
    fn jwt_policy(&self) -> &JwtPolicy;
}

/// Macro to implement `HasJwtPolicy` for state structs with a `policy: Arc<JwtPolicy>` field.
///
/// # Example
/// ```ignore
/// use cookiejwt::impl_has_jwt_policy;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub policy: Arc<JwtPolicy>,
///     // ... other fields
/// }
///
/// impl_has_jwt_policy!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_jwt_policy {
    ($state_type:ty) => {
        impl $crate::auth::HasJwtPolicy for $state_type {
            fn jwt_policy(&self) -> &$crate::policy::JwtPolicy {
                &self.policy
            }
        }
    };
}
