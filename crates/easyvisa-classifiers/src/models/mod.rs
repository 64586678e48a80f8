pub mod adaboost;
pub mod decision_tree;
pub mod gbdt;
pub mod random_forest;
pub mod xgboost;

pub mod classifier_trait;
pub mod factory;
