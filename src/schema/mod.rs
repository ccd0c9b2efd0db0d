pub mod applier;
pub mod reconciler;
