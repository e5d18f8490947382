/// Router Module Index
///
/// Public routes carry no guard. Every catalog route is wrapped in its own access
/// gate, so a route cannot be registered without declaring the operation it performs.

/// Routes accessible without an identity: the landing redirect and health probe.
pub mod public;

/// The five operations of each catalog entity, each behind `access::enforce`.
pub mod catalog;
