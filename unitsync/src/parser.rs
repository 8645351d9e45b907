//! unitsync 内置 Lua 解析器
//!
//! 解析器状态保存在动态库内部，同一时间只有一个。先 `open_*`，再 `execute`，
//! 然后用 `root_table` / `sub_table` / `pop_table` 在表之间移动并读取键值。

use std::ffi::{c_int, CString};

use crate::error::Result;
use crate::library::{from_c, UnitSyncLib};

/// 表的键，整数或字符串
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuaKey<'a> {
    Int(i32),
    Str(&'a str),
}

impl From<i32> for LuaKey<'_> {
    fn from(key: i32) -> Self {
        LuaKey::Int(key)
    }
}

impl<'a> From<&'a str> for LuaKey<'a> {
    fn from(key: &'a str) -> Self {
        LuaKey::Str(key)
    }
}

/// 键对应值的 Lua 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuaType {
    None,
    Nil,
    Boolean,
    LightUserData,
    Number,
    String,
    Table,
    Function,
    UserData,
    Thread,
}

impl LuaType {
    fn from_raw(value: c_int) -> Self {
        match value {
            0 => Self::Nil,
            1 => Self::Boolean,
            2 => Self::LightUserData,
            3 => Self::Number,
            4 => Self::String,
            5 => Self::Table,
            6 => Self::Function,
            7 => Self::UserData,
            8 => Self::Thread,
            _ => Self::None,
        }
    }
}

/// 键列表中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LuaKeyEntry {
    Int(i32),
    Str(String),
}

/// Lua 解析器
pub struct LuaParser<'a> {
    lib: &'a UnitSyncLib,
}

impl UnitSyncLib {
    pub fn lua_parser(&self) -> LuaParser<'_> {
        LuaParser { lib: self }
    }
}

/// 已转换为 C 形式的键
enum CKey {
    Int(c_int),
    Str(CString),
}

impl CKey {
    fn new(key: LuaKey<'_>) -> Result<Self> {
        Ok(match key {
            LuaKey::Int(k) => CKey::Int(k),
            LuaKey::Str(k) => CKey::Str(CString::new(k)?),
        })
    }
}

impl LuaParser<'_> {
    pub fn close(&self) -> Result<()> {
        self.lib.with(|lib| {
            unsafe { (lib.api.lp_close)() };
            Ok(())
        })
    }

    pub fn open_file(&self, filename: &str, file_modes: &str, access_modes: &str) -> Result<bool> {
        self.lib.with(|lib| {
            let filename = CString::new(filename)?;
            let file_modes = CString::new(file_modes)?;
            let access_modes = CString::new(access_modes)?;
            let ok = unsafe {
                (lib.api.lp_open_file)(filename.as_ptr(), file_modes.as_ptr(), access_modes.as_ptr())
            };
            Ok(ok != 0)
        })
    }

    pub fn open_source(&self, source: &str, access_modes: &str) -> Result<bool> {
        self.lib.with(|lib| {
            let source = CString::new(source)?;
            let access_modes = CString::new(access_modes)?;
            Ok(unsafe { (lib.api.lp_open_source)(source.as_ptr(), access_modes.as_ptr()) } != 0)
        })
    }

    /// 执行已打开的代码，失败时查看 error_log
    pub fn execute(&self) -> Result<bool> {
        self.lib.with(|lib| Ok(unsafe { (lib.api.lp_execute)() } != 0))
    }

    pub fn error_log(&self) -> Result<String> {
        self.lib.with(|lib| Ok(unsafe { from_c((lib.api.lp_error_log)()) }))
    }

    // === 向解析器传入表 ===

    /// 开始一个子表，`override_existing` 为 true 时覆盖已有的表
    pub fn add_table<'k>(&self, key: impl Into<LuaKey<'k>>, override_existing: bool) -> Result<()> {
        let (key, flag) = (key.into(), c_int::from(override_existing));
        self.lib.with(|lib| {
            match CKey::new(key)? {
                CKey::Int(k) => unsafe { (lib.api.lp_add_table_int)(k, flag) },
                CKey::Str(k) => unsafe { (lib.api.lp_add_table_str)(k.as_ptr(), flag) },
            }
            Ok(())
        })
    }

    pub fn end_table(&self) -> Result<()> {
        self.lib.with(|lib| {
            unsafe { (lib.api.lp_end_table)() };
            Ok(())
        })
    }

    pub fn add_int<'k>(&self, key: impl Into<LuaKey<'k>>, value: i32) -> Result<()> {
        let key = key.into();
        self.lib.with(|lib| {
            match CKey::new(key)? {
                CKey::Int(k) => unsafe { (lib.api.lp_add_int_key_int_val)(k, value) },
                CKey::Str(k) => unsafe { (lib.api.lp_add_str_key_int_val)(k.as_ptr(), value) },
            }
            Ok(())
        })
    }

    pub fn add_bool<'k>(&self, key: impl Into<LuaKey<'k>>, value: bool) -> Result<()> {
        let (key, value) = (key.into(), c_int::from(value));
        self.lib.with(|lib| {
            match CKey::new(key)? {
                CKey::Int(k) => unsafe { (lib.api.lp_add_int_key_bool_val)(k, value) },
                CKey::Str(k) => unsafe { (lib.api.lp_add_str_key_bool_val)(k.as_ptr(), value) },
            }
            Ok(())
        })
    }

    pub fn add_float<'k>(&self, key: impl Into<LuaKey<'k>>, value: f32) -> Result<()> {
        let key = key.into();
        self.lib.with(|lib| {
            match CKey::new(key)? {
                CKey::Int(k) => unsafe { (lib.api.lp_add_int_key_float_val)(k, value) },
                CKey::Str(k) => unsafe { (lib.api.lp_add_str_key_float_val)(k.as_ptr(), value) },
            }
            Ok(())
        })
    }

    pub fn add_str<'k>(&self, key: impl Into<LuaKey<'k>>, value: &str) -> Result<()> {
        let key = key.into();
        self.lib.with(|lib| {
            let value = CString::new(value)?;
            match CKey::new(key)? {
                CKey::Int(k) => unsafe { (lib.api.lp_add_int_key_str_val)(k, value.as_ptr()) },
                CKey::Str(k) => unsafe {
                    (lib.api.lp_add_str_key_str_val)(k.as_ptr(), value.as_ptr())
                },
            }
            Ok(())
        })
    }

    // === 表导航 ===

    pub fn root_table(&self) -> Result<bool> {
        self.lib.with(|lib| Ok(unsafe { (lib.api.lp_root_table)() } != 0))
    }

    /// 以表达式（如 `"mapinfo.smf"`）定位根表
    pub fn root_table_expr(&self, expr: &str) -> Result<bool> {
        self.lib.with(|lib| {
            let expr = CString::new(expr)?;
            Ok(unsafe { (lib.api.lp_root_table_expr)(expr.as_ptr()) } != 0)
        })
    }

    pub fn sub_table<'k>(&self, key: impl Into<LuaKey<'k>>) -> Result<bool> {
        let key = key.into();
        self.lib.with(|lib| {
            let found = match CKey::new(key)? {
                CKey::Int(k) => unsafe { (lib.api.lp_sub_table_int)(k) },
                CKey::Str(k) => unsafe { (lib.api.lp_sub_table_str)(k.as_ptr()) },
            };
            Ok(found != 0)
        })
    }

    pub fn sub_table_expr(&self, expr: &str) -> Result<bool> {
        self.lib.with(|lib| {
            let expr = CString::new(expr)?;
            Ok(unsafe { (lib.api.lp_sub_table_expr)(expr.as_ptr()) } != 0)
        })
    }

    pub fn pop_table(&self) -> Result<()> {
        self.lib.with(|lib| {
            unsafe { (lib.api.lp_pop_table)() };
            Ok(())
        })
    }

    // === 键查询 ===

    pub fn key_exists<'k>(&self, key: impl Into<LuaKey<'k>>) -> Result<bool> {
        let key = key.into();
        self.lib.with(|lib| {
            let exists = match CKey::new(key)? {
                CKey::Int(k) => unsafe { (lib.api.lp_get_key_exists_int)(k) },
                CKey::Str(k) => unsafe { (lib.api.lp_get_key_exists_str)(k.as_ptr()) },
            };
            Ok(exists != 0)
        })
    }

    pub fn key_type<'k>(&self, key: impl Into<LuaKey<'k>>) -> Result<LuaType> {
        let key = key.into();
        self.lib.with(|lib| {
            let raw = match CKey::new(key)? {
                CKey::Int(k) => unsafe { (lib.api.lp_get_int_key_type)(k) },
                CKey::Str(k) => unsafe { (lib.api.lp_get_str_key_type)(k.as_ptr()) },
            };
            Ok(LuaType::from_raw(raw))
        })
    }

    /// 当前表的全部键，整数键在前
    pub fn keys(&self) -> Result<Vec<LuaKeyEntry>> {
        self.lib.with(|lib| unsafe {
            let int_count = (lib.api.lp_get_int_key_list_count)();
            let str_count = (lib.api.lp_get_str_key_list_count)();
            let ints = (0..int_count).map(|i| LuaKeyEntry::Int((lib.api.lp_get_int_key_list_entry)(i)));
            let strs = (0..str_count)
                .map(|i| LuaKeyEntry::Str(from_c((lib.api.lp_get_str_key_list_entry)(i))));
            Ok(ints.chain(strs).collect())
        })
    }

    // === 取值，键不存在或类型不符时返回默认值 ===

    pub fn get_int<'k>(&self, key: impl Into<LuaKey<'k>>, default: i32) -> Result<i32> {
        let key = key.into();
        self.lib.with(|lib| {
            Ok(match CKey::new(key)? {
                CKey::Int(k) => unsafe { (lib.api.lp_get_int_key_int_val)(k, default) },
                CKey::Str(k) => unsafe { (lib.api.lp_get_str_key_int_val)(k.as_ptr(), default) },
            })
        })
    }

    pub fn get_bool<'k>(&self, key: impl Into<LuaKey<'k>>, default: bool) -> Result<bool> {
        let (key, default) = (key.into(), c_int::from(default));
        self.lib.with(|lib| {
            let value = match CKey::new(key)? {
                CKey::Int(k) => unsafe { (lib.api.lp_get_int_key_bool_val)(k, default) },
                CKey::Str(k) => unsafe { (lib.api.lp_get_str_key_bool_val)(k.as_ptr(), default) },
            };
            Ok(value != 0)
        })
    }

    pub fn get_float<'k>(&self, key: impl Into<LuaKey<'k>>, default: f32) -> Result<f32> {
        let key = key.into();
        self.lib.with(|lib| {
            Ok(match CKey::new(key)? {
                CKey::Int(k) => unsafe { (lib.api.lp_get_int_key_float_val)(k, default) },
                CKey::Str(k) => unsafe { (lib.api.lp_get_str_key_float_val)(k.as_ptr(), default) },
            })
        })
    }

    pub fn get_str<'k>(&self, key: impl Into<LuaKey<'k>>, default: &str) -> Result<String> {
        let key = key.into();
        self.lib.with(|lib| {
            let default = CString::new(default)?;
            Ok(match CKey::new(key)? {
                CKey::Int(k) => unsafe { from_c((lib.api.lp_get_int_key_str_val)(k, default.as_ptr())) },
                CKey::Str(k) => unsafe {
                    from_c((lib.api.lp_get_str_key_str_val)(k.as_ptr(), default.as_ptr()))
                },
            })
        })
    }
}
