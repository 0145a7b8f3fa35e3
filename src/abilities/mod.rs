//! 能力层：能力 trait、注册表与内置能力（网页、金融数据、文件、finish）

pub mod file_system;
pub mod finance;
pub mod finish;
pub mod registry;
pub mod web;

use std::sync::Arc;

use crate::config::AbilitiesSection;
use crate::workspace::Workspace;

pub use file_system::{ListFilesAbility, ReadFileAbility, WriteFileAbility};
pub use finance::FetchFinancialDataAbility;
pub use finish::{FinishAbility, FINISH_ABILITY};
pub use registry::{
    validate_args, Ability, AbilityContext, AbilityOutput, AbilityParameter, AbilityRegistry,
    ParameterType,
};
pub use web::{FetchAndSearchAbility, FetchWebpageAbility};

/// 创建注册了全部内置能力的注册表
pub fn builtin_registry(cfg: &AbilitiesSection, workspace: Arc<dyn Workspace>) -> AbilityRegistry {
    let mut abilities = AbilityRegistry::new(workspace);
    abilities.register(FinishAbility);
    abilities.register(FetchAndSearchAbility::new(cfg.fetch_timeout_secs));
    abilities.register(FetchWebpageAbility::new(cfg.fetch_timeout_secs));
    abilities.register(FetchFinancialDataAbility::new(
        cfg.finance.clone(),
        cfg.fetch_timeout_secs,
    ));
    abilities.register(ReadFileAbility);
    abilities.register(WriteFileAbility);
    abilities.register(ListFilesAbility);
    abilities
}
