//! unitsync 动态库绑定
//!
//! 包含:
//! - 运行时加载 unitsync 并按名称解析函数 (UnitSyncLib)
//! - 地图、游戏、VFS、选项、Spring 配置查询
//! - 小地图、金属图、高度图转换 (UnitSyncImage)
//! - 内置 Lua 解析器 (LuaParser)

mod api;
mod error;
mod image;
mod library;
mod parser;

pub use error::{Result, UnitSyncError};
pub use image::UnitSyncImage;
pub use library::{AiInfoEntry, Feature, MapInfo, OptionType, StartPos, UnitSyncLib};
pub use parser::{LuaKey, LuaKeyEntry, LuaParser, LuaType};
