//! unitsync 导出函数表
//!
//! 按名称解析符号。必需函数缺失时加载失败，可选函数缺失时只在调用时报错。

use std::ffi::{c_char, c_float, c_int, c_uint, c_void};

use libloading::Library;

use crate::error::{Result, UnitSyncError};

/// 旧版 GetMapInfoEx 使用的起始点
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RawStartPos {
    pub x: c_int,
    pub z: c_int,
}

/// 旧版 GetMapInfoEx 填充的结构
#[repr(C)]
#[derive(Debug)]
pub(crate) struct RawMapInfo {
    pub description: *mut c_char,
    pub tidal_strength: c_int,
    pub gravity: c_int,
    pub max_metal: c_float,
    pub extractor_radius: c_int,
    pub min_wind: c_int,
    pub max_wind: c_int,
    pub width: c_int,
    pub height: c_int,
    pub pos_count: c_int,
    pub positions: [RawStartPos; 16],
    pub author: *mut c_char,
}

macro_rules! unitsync_api {
    (
        required {
            $( $rf:ident = $rs:literal : fn($($ra:ty),*) $(-> $rr:ty)?; )*
        }
        optional {
            $( $of:ident = $os:literal : fn($($oa:ty),*) $(-> $or:ty)?; )*
        }
    ) => {
        pub(crate) struct Api {
            $( pub(crate) $rf: unsafe extern "C" fn($($ra),*) $(-> $rr)?, )*
            $( pub(crate) $of: Option<unsafe extern "C" fn($($oa),*) $(-> $or)?>, )*
        }

        impl Api {
            /// 解析全部符号，返回的函数指针只在 `lib` 存活期间有效
            pub(crate) unsafe fn resolve(lib: &Library) -> Result<Self> {
                Ok(Self {
                    $(
                        $rf: match lib.get::<unsafe extern "C" fn($($ra),*) $(-> $rr)?>(
                            concat!($rs, "\0").as_bytes(),
                        ) {
                            Ok(symbol) => *symbol,
                            Err(_) => {
                                tracing::error!("Couldn't load {} from unitsync library", $rs);
                                return Err(UnitSyncError::FunctionMissing($rs));
                            }
                        },
                    )*
                    $(
                        $of: match lib.get::<unsafe extern "C" fn($($oa),*) $(-> $or)?>(
                            concat!($os, "\0").as_bytes(),
                        ) {
                            Ok(symbol) => Some(*symbol),
                            Err(_) => {
                                tracing::debug!("Optional function {} not in unitsync library", $os);
                                None
                            }
                        },
                    )*
                })
            }

            $(
                #[allow(dead_code)]
                pub(crate) fn $rf(&self) -> Result<unsafe extern "C" fn($($ra),*) $(-> $rr)?> {
                    Ok(self.$rf)
                }
            )*

            $(
                #[allow(dead_code)]
                pub(crate) fn $of(&self) -> Result<unsafe extern "C" fn($($oa),*) $(-> $or)?> {
                    self.$of.ok_or(UnitSyncError::FunctionMissing($os))
                }
            )*

            /// 可选函数是否存在
            pub(crate) fn has(&self, name: &str) -> bool {
                match name {
                    $( $os => self.$of.is_some(), )*
                    $( $rs => true, )*
                    _ => false,
                }
            }
        }
    };
}

unitsync_api! {
    required {
        init = "Init": fn(bool, c_int) -> c_int;
        un_init = "UnInit": fn();
        get_next_error = "GetNextError": fn() -> *const c_char;
        get_spring_version = "GetSpringVersion": fn() -> *const c_char;

        get_map_count = "GetMapCount": fn() -> c_int;
        get_map_checksum = "GetMapChecksum": fn(c_int) -> c_uint;
        get_map_checksum_from_name = "GetMapChecksumFromName": fn(*const c_char) -> c_uint;
        get_map_name = "GetMapName": fn(c_int) -> *const c_char;
        get_map_archive_count = "GetMapArchiveCount": fn(*const c_char) -> c_int;
        get_map_archive_name = "GetMapArchiveName": fn(c_int) -> *const c_char;
        get_minimap = "GetMinimap": fn(*const c_char, c_int) -> *const u16;

        get_mod_count = "GetPrimaryModCount": fn() -> c_int;
        get_mod_name = "GetPrimaryModName": fn(c_int) -> *const c_char;
        get_mod_index = "GetPrimaryModIndex": fn(*const c_char) -> c_int;
        get_mod_archive = "GetPrimaryModArchive": fn(c_int) -> *const c_char;
        get_mod_checksum = "GetPrimaryModChecksum": fn(c_int) -> c_uint;
        get_mod_checksum_from_name = "GetPrimaryModChecksumFromName": fn(*const c_char) -> c_uint;
        get_mod_archive_count = "GetPrimaryModArchiveCount": fn(c_int) -> c_int;
        get_mod_archive_list = "GetPrimaryModArchiveList": fn(c_int) -> *const c_char;

        get_side_count = "GetSideCount": fn() -> c_int;
        get_side_name = "GetSideName": fn(c_int) -> *const c_char;
        add_all_archives = "AddAllArchives": fn(*const c_char);
        add_archive = "AddArchive": fn(*const c_char);
        get_archive_checksum = "GetArchiveChecksum": fn(*const c_char) -> c_uint;
        get_archive_path = "GetArchivePath": fn(*const c_char) -> *const c_char;

        get_unit_count = "GetUnitCount": fn() -> c_int;
        get_unit_name = "GetUnitName": fn(c_int) -> *const c_char;
        get_full_unit_name = "GetFullUnitName": fn(c_int) -> *const c_char;
        process_units = "ProcessUnits": fn() -> c_int;
        process_units_no_checksum = "ProcessUnitsNoChecksum": fn() -> c_int;

        init_find_vfs = "InitFindVFS": fn(*const c_char) -> c_int;
        find_files_vfs = "FindFilesVFS": fn(c_int, *mut c_char, c_int) -> c_int;
        open_file_vfs = "OpenFileVFS": fn(*const c_char) -> c_int;
        file_size_vfs = "FileSizeVFS": fn(c_int) -> c_int;
        read_file_vfs = "ReadFileVFS": fn(c_int, *mut c_void, c_int) -> c_int;
        close_file_vfs = "CloseFileVFS": fn(c_int);

        open_archive = "OpenArchive": fn(*const c_char) -> c_int;
        close_archive = "CloseArchive": fn(c_int);
        find_files_archive = "FindFilesArchive": fn(c_int, c_int, *mut c_char, *mut c_int) -> c_int;
        open_archive_file = "OpenArchiveFile": fn(c_int, *const c_char) -> c_int;
        read_archive_file = "ReadArchiveFile": fn(c_int, c_int, *mut c_void, c_int) -> c_int;
        close_archive_file = "CloseArchiveFile": fn(c_int, c_int);
        size_archive_file = "SizeArchiveFile": fn(c_int, c_int) -> c_int;

        get_mod_valid_map_count = "GetModValidMapCount": fn() -> c_int;
        get_mod_valid_map = "GetModValidMap": fn(c_int) -> *const c_char;
        get_lua_ai_count = "GetLuaAICount": fn() -> c_int;
        get_lua_ai_name = "GetLuaAIName": fn(c_int) -> *const c_char;
        get_lua_ai_desc = "GetLuaAIDesc": fn(c_int) -> *const c_char;

        get_map_option_count = "GetMapOptionCount": fn(*const c_char) -> c_int;
        get_mod_option_count = "GetModOptionCount": fn() -> c_int;
        get_option_key = "GetOptionKey": fn(c_int) -> *const c_char;
        get_option_name = "GetOptionName": fn(c_int) -> *const c_char;
        get_option_desc = "GetOptionDesc": fn(c_int) -> *const c_char;
        get_option_type = "GetOptionType": fn(c_int) -> c_int;
        get_option_bool_def = "GetOptionBoolDef": fn(c_int) -> c_int;
        get_option_number_def = "GetOptionNumberDef": fn(c_int) -> c_float;
        get_option_number_min = "GetOptionNumberMin": fn(c_int) -> c_float;
        get_option_number_max = "GetOptionNumberMax": fn(c_int) -> c_float;
        get_option_number_step = "GetOptionNumberStep": fn(c_int) -> c_float;
        get_option_string_def = "GetOptionStringDef": fn(c_int) -> *const c_char;
        get_option_string_max_len = "GetOptionStringMaxLen": fn(c_int) -> c_int;
        get_option_list_count = "GetOptionListCount": fn(c_int) -> c_int;
        get_option_list_def = "GetOptionListDef": fn(c_int) -> *const c_char;
        get_option_list_item_key = "GetOptionListItemKey": fn(c_int, c_int) -> *const c_char;
        get_option_list_item_name = "GetOptionListItemName": fn(c_int, c_int) -> *const c_char;
        get_option_list_item_desc = "GetOptionListItemDesc": fn(c_int, c_int) -> *const c_char;

        get_spring_config_string = "GetSpringConfigString": fn(*const c_char, *const c_char) -> *const c_char;
        get_spring_config_int = "GetSpringConfigInt": fn(*const c_char, c_int) -> c_int;
        get_spring_config_float = "GetSpringConfigFloat": fn(*const c_char, c_float) -> c_float;

        lp_close = "lpClose": fn();
        lp_open_file = "lpOpenFile": fn(*const c_char, *const c_char, *const c_char) -> c_int;
        lp_open_source = "lpOpenSource": fn(*const c_char, *const c_char) -> c_int;
        lp_execute = "lpExecute": fn() -> c_int;
        lp_error_log = "lpErrorLog": fn() -> *const c_char;

        lp_add_table_int = "lpAddTableInt": fn(c_int, c_int);
        lp_add_table_str = "lpAddTableStr": fn(*const c_char, c_int);
        lp_end_table = "lpEndTable": fn();
        lp_add_int_key_int_val = "lpAddIntKeyIntVal": fn(c_int, c_int);
        lp_add_str_key_int_val = "lpAddStrKeyIntVal": fn(*const c_char, c_int);
        lp_add_int_key_bool_val = "lpAddIntKeyBoolVal": fn(c_int, c_int);
        lp_add_str_key_bool_val = "lpAddStrKeyBoolVal": fn(*const c_char, c_int);
        lp_add_int_key_float_val = "lpAddIntKeyFloatVal": fn(c_int, c_float);
        lp_add_str_key_float_val = "lpAddStrKeyFloatVal": fn(*const c_char, c_float);
        lp_add_int_key_str_val = "lpAddIntKeyStrVal": fn(c_int, *const c_char);
        lp_add_str_key_str_val = "lpAddStrKeyStrVal": fn(*const c_char, *const c_char);

        lp_root_table = "lpRootTable": fn() -> c_int;
        lp_root_table_expr = "lpRootTableExpr": fn(*const c_char) -> c_int;
        lp_sub_table_int = "lpSubTableInt": fn(c_int) -> c_int;
        lp_sub_table_str = "lpSubTableStr": fn(*const c_char) -> c_int;
        lp_sub_table_expr = "lpSubTableExpr": fn(*const c_char) -> c_int;
        lp_pop_table = "lpPopTable": fn();

        lp_get_key_exists_int = "lpGetKeyExistsInt": fn(c_int) -> c_int;
        lp_get_key_exists_str = "lpGetKeyExistsStr": fn(*const c_char) -> c_int;
        lp_get_int_key_type = "lpGetIntKeyType": fn(c_int) -> c_int;
        lp_get_str_key_type = "lpGetStrKeyType": fn(*const c_char) -> c_int;
        lp_get_int_key_list_count = "lpGetIntKeyListCount": fn() -> c_int;
        lp_get_int_key_list_entry = "lpGetIntKeyListEntry": fn(c_int) -> c_int;
        lp_get_str_key_list_count = "lpGetStrKeyListCount": fn() -> c_int;
        lp_get_str_key_list_entry = "lpGetStrKeyListEntry": fn(c_int) -> *const c_char;

        lp_get_int_key_int_val = "lpGetIntKeyIntVal": fn(c_int, c_int) -> c_int;
        lp_get_str_key_int_val = "lpGetStrKeyIntVal": fn(*const c_char, c_int) -> c_int;
        lp_get_int_key_bool_val = "lpGetIntKeyBoolVal": fn(c_int, c_int) -> c_int;
        lp_get_str_key_bool_val = "lpGetStrKeyBoolVal": fn(*const c_char, c_int) -> c_int;
        lp_get_int_key_float_val = "lpGetIntKeyFloatVal": fn(c_int, c_float) -> c_float;
        lp_get_str_key_float_val = "lpGetStrKeyFloatVal": fn(*const c_char, c_float) -> c_float;
        lp_get_int_key_str_val = "lpGetIntKeyStrVal": fn(c_int, *const c_char) -> *const c_char;
        lp_get_str_key_str_val = "lpGetStrKeyStrVal": fn(*const c_char, *const c_char) -> *const c_char;
    }
    optional {
        get_writable_data_dir = "GetWritableDataDirectory": fn() -> *const c_char;
        get_data_dir_count = "GetDataDirectoryCount": fn() -> c_int;
        get_data_dir = "GetDataDirectory": fn(c_int) -> *const c_char;
        remove_all_archives = "RemoveAllArchives": fn();

        get_map_description = "GetMapDescription": fn(c_int) -> *const c_char;
        get_map_author = "GetMapAuthor": fn(c_int) -> *const c_char;
        get_map_width = "GetMapWidth": fn(c_int) -> c_int;
        get_map_height = "GetMapHeight": fn(c_int) -> c_int;
        get_map_tidal_strength = "GetMapTidalStrength": fn(c_int) -> c_int;
        get_map_wind_min = "GetMapWindMin": fn(c_int) -> c_int;
        get_map_wind_max = "GetMapWindMax": fn(c_int) -> c_int;
        get_map_gravity = "GetMapGravity": fn(c_int) -> c_int;
        get_map_resource_count = "GetMapResourceCount": fn(c_int) -> c_int;
        get_map_resource_max = "GetMapResourceMax": fn(c_int, c_int) -> c_float;
        get_map_resource_extractor_radius = "GetMapResourceExtractorRadius": fn(c_int, c_int) -> c_int;
        get_map_pos_count = "GetMapPosCount": fn(c_int) -> c_int;
        get_map_pos_x = "GetMapPosX": fn(c_int, c_int) -> c_float;
        get_map_pos_z = "GetMapPosZ": fn(c_int, c_int) -> c_float;
        get_map_info_ex = "GetMapInfoEx": fn(*const c_char, *mut RawMapInfo, c_int) -> c_int;
        get_info_map_size = "GetInfoMapSize": fn(*const c_char, *const c_char, *mut c_int, *mut c_int) -> c_int;
        get_info_map = "GetInfoMap": fn(*const c_char, *const c_char, *mut c_void, c_int) -> c_int;

        get_mod_short_name = "GetPrimaryModShortName": fn(c_int) -> *const c_char;
        get_mod_version = "GetPrimaryModVersion": fn(c_int) -> *const c_char;
        get_mod_mutator = "GetPrimaryModMutator": fn(c_int) -> *const c_char;
        get_mod_game = "GetPrimaryModGame": fn(c_int) -> *const c_char;
        get_mod_short_game = "GetPrimaryModShortGame": fn(c_int) -> *const c_char;
        get_mod_description = "GetPrimaryModDescription": fn(c_int) -> *const c_char;

        get_custom_option_count = "GetCustomOptionCount": fn(*const c_char) -> c_int;
        get_skirmish_ai_option_count = "GetSkirmishAIOptionCount": fn(c_int) -> c_int;
        get_option_section = "GetOptionSection": fn(c_int) -> *const c_char;
        get_option_style = "GetOptionStyle": fn(c_int) -> *const c_char;

        set_spring_config_file = "SetSpringConfigFile": fn(*const c_char);
        get_spring_config_file = "GetSpringConfigFile": fn() -> *const c_char;
        set_spring_config_string = "SetSpringConfigString": fn(*const c_char, *const c_char);
        set_spring_config_int = "SetSpringConfigInt": fn(*const c_char, c_int);
        set_spring_config_float = "SetSpringConfigFloat": fn(*const c_char, c_float);

        get_skirmish_ai_count = "GetSkirmishAICount": fn() -> c_int;
        get_skirmish_ai_info_count = "GetSkirmishAIInfoCount": fn(c_int) -> c_int;
        get_info_key = "GetInfoKey": fn(c_int) -> *const c_char;
        get_info_value = "GetInfoValue": fn(c_int) -> *const c_char;
        get_info_description = "GetInfoDescription": fn(c_int) -> *const c_char;
    }
}
