//! 运行时加载的 unitsync 动态库
//!
//! 所有调用都在同一把锁内进入动态库，句柄存活期间不会有并发调用。

use std::collections::BTreeMap;
use std::ffi::{c_char, c_int, CStr, CString};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use libloading::Library;

use crate::api::{Api, RawMapInfo, RawStartPos};
use crate::error::{Result, UnitSyncError};
use crate::image::UnitSyncImage;

/// 小地图边长（mip 0）
const MINIMAP_SIZE: usize = 1024;

/// 文件名缓冲区大小
const NAME_BUF_LEN: usize = 1024;

/// 旧版地图信息中字符串缓冲区大小
const MAP_INFO_BUF_LEN: usize = 256;

/// 可查询的 unitsync 特性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// 可写入 Spring 配置
    SettingsHandler,
    /// 金属图、高度图
    InfoMap,
    /// 数据目录查询
    DataDir,
    /// Skirmish AI 查询
    SkirmishAi,
}

/// 地图起始点
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StartPos {
    pub x: i32,
    pub z: i32,
}

/// 地图信息
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapInfo {
    pub description: String,
    pub author: String,
    pub tidal_strength: i32,
    pub gravity: i32,
    pub max_metal: f32,
    pub extractor_radius: f32,
    pub min_wind: i32,
    pub max_wind: i32,
    pub width: i32,
    pub height: i32,
    pub positions: Vec<StartPos>,
}

/// Skirmish AI 的一条信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiInfoEntry {
    pub key: String,
    pub value: String,
    pub description: String,
}

/// 已加载的库
pub(crate) struct Loaded {
    pub(crate) api: Api,
    path: PathBuf,
    current_mod: String,
    _lib: Library,
}

impl Loaded {
    fn init(&mut self) {
        self.current_mod.clear();
        unsafe { (self.api.init)(true, 1) };
        for error in self.errors() {
            tracing::error!("{}", error);
        }
    }

    /// 取出 unitsync 中排队的错误
    fn errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        loop {
            let message = unsafe { from_c((self.api.get_next_error)()) };
            if message.is_empty() {
                return errors;
            }
            errors.push(message);
        }
    }

    fn remove_all_archives(&mut self) {
        match self.api.remove_all_archives() {
            Ok(remove) => unsafe { remove() },
            Err(_) => self.init(),
        }
    }

    /// 切换当前游戏，加载其归档
    fn set_current_mod(&mut self, name: &str) -> Result<()> {
        if self.current_mod == name {
            return Ok(());
        }
        if !self.current_mod.is_empty() {
            self.remove_all_archives();
        }
        let c_name = CString::new(name)?;
        unsafe {
            let index = (self.api.get_mod_index()?)(c_name.as_ptr());
            let archive = (self.api.get_mod_archive()?)(index);
            (self.api.add_all_archives()?)(archive);
        }
        self.current_mod = name.to_string();
        Ok(())
    }

    fn mod_count(&self) -> c_int {
        unsafe { (self.api.get_mod_count)() }
    }

    fn skirmish_ai_count(&self) -> Result<c_int> {
        Ok(unsafe { (self.api.get_skirmish_ai_count()?)() })
    }
}

impl Drop for Loaded {
    fn drop(&mut self) {
        tracing::debug!("Unloading unitsync from {}", self.path.display());
        unsafe { (self.api.un_init)() };
    }
}

/// 把 unitsync 返回的 C 字符串转为 String，空指针视为空串
pub(crate) unsafe fn from_c(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

/// 把以 NUL 结尾的缓冲区转为 String
fn from_buf(buf: &[u8]) -> String {
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

fn not_empty<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    if value.is_empty() {
        return Err(UnitSyncError::InvalidArgument(format!("empty {}", what)));
    }
    Ok(value)
}

/// unitsync 动态库
#[derive(Default)]
pub struct UnitSyncLib {
    inner: Mutex<Option<Loaded>>,
}

impl UnitSyncLib {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Loaded>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 在锁内访问已加载的库
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut Loaded) -> Result<R>) -> Result<R> {
        let mut guard = self.lock();
        let loaded = guard.as_mut().ok_or(UnitSyncError::NotLoaded)?;
        f(loaded)
    }

    // ========================================================================
    // 加载
    // ========================================================================

    /// 加载动态库并初始化
    ///
    /// 同一路径重复加载不做任何事，其它路径会先卸载当前库。
    pub fn load(&self, path: &Path, config_override: Option<&Path>) -> Result<()> {
        let mut guard = self.lock();
        if guard.as_ref().is_some_and(|loaded| loaded.path == path) {
            return Ok(());
        }
        *guard = None;

        tracing::debug!("Loading from: {}", path.display());
        if !path.exists() {
            tracing::debug!("File not found: {}", path.display());
            return Err(UnitSyncError::FileNotFound(path.to_path_buf()));
        }
        if std::fs::File::open(path).is_err() {
            tracing::debug!("Couldn't read unitsync from {}", path.display());
            return Err(UnitSyncError::NotReadable(path.to_path_buf()));
        }

        let c_config = config_override
            .map(|config| CString::new(config.to_string_lossy().as_bytes()))
            .transpose()?;

        let lib = unsafe { Library::new(path) }
            .map_err(|e| UnitSyncError::LoadFailed(e.to_string()))?;
        let api = unsafe { Api::resolve(&lib) }?;
        if api.get_map_description.is_some() {
            tracing::debug!("Using new style map-info fetching (GetMap*() functions)");
        } else {
            tracing::debug!("Using old style map-info fetching (GetMapInfoEx())");
        }

        let mut loaded = Loaded {
            api,
            path: path.to_path_buf(),
            current_mod: String::new(),
            _lib: lib,
        };

        if let Some(c_path) = &c_config {
            match loaded.api.set_spring_config_file() {
                Ok(set_config) => {
                    unsafe { set_config(c_path.as_ptr()) };
                    tracing::info!("Using spring config {}", c_path.to_string_lossy());
                }
                Err(e) => tracing::warn!("Config override ignored: {}", e),
            }
        }

        loaded.init();
        *guard = Some(loaded);
        Ok(())
    }

    /// 卸载动态库
    pub fn unload(&self) {
        self.lock().take();
    }

    pub fn is_loaded(&self) -> bool {
        self.lock().is_some()
    }

    /// 当前加载的库路径
    pub fn path(&self) -> Option<PathBuf> {
        self.lock().as_ref().map(|loaded| loaded.path.clone())
    }

    /// 取出 unitsync 中排队的错误
    pub fn unitsync_errors(&self) -> Result<Vec<String>> {
        self.with(|lib| Ok(lib.errors()))
    }

    /// 有排队的错误时返回第一条
    pub fn check_errors(&self) -> Result<()> {
        self.with(|lib| match lib.errors().into_iter().next() {
            Some(error) => Err(UnitSyncError::Call(error)),
            None => Ok(()),
        })
    }

    /// 库是否提供某项特性，未加载时为 false
    pub fn supports(&self, feature: Feature) -> bool {
        let symbol = match feature {
            Feature::SettingsHandler => "SetSpringConfigString",
            Feature::InfoMap => "GetInfoMapSize",
            Feature::DataDir => "GetWritableDataDirectory",
            Feature::SkirmishAi => "GetSkirmishAICount",
        };
        self.with(|lib| Ok(lib.api.has(symbol))).unwrap_or(false)
    }

    /// 分别读取几个库文件的 Spring 版本，无法加载的跳过
    pub fn spring_version_list(&self, paths: &BTreeMap<String, PathBuf>) -> BTreeMap<String, String> {
        let _guard = self.lock();
        let mut versions = BTreeMap::new();
        for (name, path) in paths {
            match read_spring_version(path) {
                Ok(version) => {
                    tracing::debug!("Found spring version: {}", version);
                    versions.insert(name.clone(), version);
                }
                Err(e) => tracing::debug!("Skipping {}: {}", path.display(), e),
            }
        }
        versions
    }

    // ========================================================================
    // 版本与目录
    // ========================================================================

    pub fn spring_version(&self) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_spring_version)()) }))
    }

    /// 可写数据目录
    pub fn spring_data_dir(&self) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_writable_data_dir()?)()) }))
    }

    pub fn data_dir_count(&self) -> Result<i32> {
        self.with(|lib| Ok(unsafe { (lib.api.get_data_dir_count()?)() }))
    }

    pub fn data_dir(&self, index: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_data_dir()?)(index)) }))
    }

    /// 全部数据目录
    pub fn data_dirs(&self) -> Result<Vec<String>> {
        self.with(|lib| {
            let count = unsafe { (lib.api.get_data_dir_count()?)() };
            let get = lib.api.get_data_dir()?;
            Ok((0..count).map(|i| unsafe { from_c(get(i)) }).collect())
        })
    }

    pub fn spring_config_file(&self) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_spring_config_file()?)()) }))
    }

    // ========================================================================
    // 地图
    // ========================================================================

    pub fn map_count(&self) -> Result<i32> {
        self.with(|lib| Ok(unsafe { (lib.api.get_map_count)() }))
    }

    pub fn map_name(&self, index: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_map_name)(index)) }))
    }

    pub fn map_checksum(&self, index: i32) -> Result<u32> {
        self.with(|lib| Ok(unsafe { (lib.api.get_map_checksum)(index) }))
    }

    pub fn map_checksum_from_name(&self, name: &str) -> Result<u32> {
        self.with(|lib| {
            let c_name = CString::new(name)?;
            Ok(unsafe { (lib.api.get_map_checksum_from_name)(c_name.as_ptr()) })
        })
    }

    pub fn map_archive_count(&self, index: i32) -> Result<i32> {
        self.with(|lib| {
            Ok(unsafe { (lib.api.get_map_archive_count)((lib.api.get_map_name)(index)) })
        })
    }

    pub fn map_archive_name(&self, archive: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_map_archive_name)(archive)) }))
    }

    /// 地图依赖的归档
    pub fn map_deps(&self, index: i32) -> Result<Vec<String>> {
        self.with(|lib| unsafe {
            let count = (lib.api.get_map_archive_count)((lib.api.get_map_name)(index));
            Ok((0..count)
                .map(|i| from_c((lib.api.get_map_archive_name)(i)))
                .collect())
        })
    }

    /// 地图信息，优先使用逐项查询的新接口
    pub fn map_info(&self, index: i32) -> Result<MapInfo> {
        self.with(|lib| {
            if lib.api.get_map_description.is_some() {
                map_info_new(&lib.api, index)
            } else {
                map_info_old(&lib.api, index)
            }
        })
    }

    /// 小地图，`map_file` 为地图名
    pub fn minimap(&self, map_file: &str) -> Result<UnitSyncImage> {
        tracing::debug!("Minimap: {}", map_file);
        self.with(|lib| {
            let c_name = CString::new(map_file)?;
            // 返回的是库内部的静态缓冲区
            let colours = unsafe { (lib.api.get_minimap)(c_name.as_ptr(), 0) };
            if colours.is_null() {
                return Err(UnitSyncError::Call("Get minimap failed".to_string()));
            }
            let colours = unsafe { std::slice::from_raw_parts(colours, MINIMAP_SIZE * MINIMAP_SIZE) };
            Ok(UnitSyncImage::from_rgb565(MINIMAP_SIZE, MINIMAP_SIZE, colours))
        })
    }

    pub fn metalmap(&self, map_file: &str) -> Result<UnitSyncImage> {
        tracing::debug!("Metalmap: {}", map_file);
        let (width, height, values) = self.info_map::<u8>(map_file, "metal")?;
        Ok(UnitSyncImage::from_metal(width, height, &values))
    }

    pub fn heightmap(&self, map_file: &str) -> Result<UnitSyncImage> {
        tracing::debug!("Heightmap: {}", map_file);
        let (width, height, values) = self.info_map::<u16>(map_file, "height")?;
        Ok(UnitSyncImage::from_heights(width, height, &values))
    }

    /// 读取信息图，每像素 `size_of::<T>()` 字节
    fn info_map<T: Copy + Default>(&self, map_file: &str, name: &str) -> Result<(usize, usize, Vec<T>)> {
        self.with(|lib| {
            let c_map = CString::new(map_file)?;
            let c_name = CString::new(name)?;
            let size_fn = lib.api.get_info_map_size()?;
            let get_fn = lib.api.get_info_map()?;

            let (mut width, mut height): (c_int, c_int) = (0, 0);
            let ok = unsafe { size_fn(c_map.as_ptr(), c_name.as_ptr(), &mut width, &mut height) };
            if ok == 0 || width <= 0 || height <= 0 {
                return Err(UnitSyncError::Call(format!("Get {}map size failed", name)));
            }

            let (width, height) = (width as usize, height as usize);
            let mut values = vec![T::default(); width * height];
            let ok = unsafe {
                get_fn(
                    c_map.as_ptr(),
                    c_name.as_ptr(),
                    values.as_mut_ptr().cast(),
                    std::mem::size_of::<T>() as c_int,
                )
            };
            if ok == 0 {
                return Err(UnitSyncError::Call(format!("Get {}map failed", name)));
            }
            Ok((width, height, values))
        })
    }

    // ========================================================================
    // 游戏 (primary mod)
    // ========================================================================

    pub fn primary_mod_count(&self) -> Result<i32> {
        self.with(|lib| Ok(lib.mod_count()))
    }

    pub fn primary_mod_name(&self, index: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_mod_name)(index)) }))
    }

    /// 按名称查找游戏，不存在时为 None
    pub fn primary_mod_index(&self, name: &str) -> Result<Option<i32>> {
        self.with(|lib| {
            let c_name = CString::new(name)?;
            let index = unsafe { (lib.api.get_mod_index)(c_name.as_ptr()) };
            Ok((index >= 0).then_some(index))
        })
    }

    pub fn primary_mod_archive(&self, index: i32) -> Result<String> {
        self.with(|lib| {
            let count = lib.mod_count();
            if index < 0 || index >= count {
                return Err(UnitSyncError::IndexOutOfBounds { index, count });
            }
            Ok(unsafe { from_c((lib.api.get_mod_archive)(index)) })
        })
    }

    pub fn primary_mod_short_name(&self, index: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_mod_short_name()?)(index)) }))
    }

    pub fn primary_mod_version(&self, index: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_mod_version()?)(index)) }))
    }

    pub fn primary_mod_mutator(&self, index: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_mod_mutator()?)(index)) }))
    }

    pub fn primary_mod_game(&self, index: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_mod_game()?)(index)) }))
    }

    pub fn primary_mod_short_game(&self, index: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_mod_short_game()?)(index)) }))
    }

    pub fn primary_mod_description(&self, index: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_mod_description()?)(index)) }))
    }

    pub fn primary_mod_checksum(&self, index: i32) -> Result<u32> {
        self.with(|lib| Ok(unsafe { (lib.api.get_mod_checksum)(index) }))
    }

    pub fn primary_mod_checksum_from_name(&self, name: &str) -> Result<u32> {
        self.with(|lib| {
            let c_name = CString::new(name)?;
            Ok(unsafe { (lib.api.get_mod_checksum_from_name)(c_name.as_ptr()) })
        })
    }

    pub fn primary_mod_archive_count(&self, index: i32) -> Result<i32> {
        self.with(|lib| Ok(unsafe { (lib.api.get_mod_archive_count)(index) }))
    }

    pub fn primary_mod_archive_list(&self, archive: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_mod_archive_list)(archive)) }))
    }

    /// 游戏依赖的归档
    pub fn mod_deps(&self, index: i32) -> Result<Vec<String>> {
        self.with(|lib| unsafe {
            let count = (lib.api.get_mod_archive_count)(index);
            Ok((0..count)
                .map(|i| from_c((lib.api.get_mod_archive_list)(i)))
                .collect())
        })
    }

    /// 切换当前游戏
    pub fn set_current_mod(&self, name: &str) -> Result<()> {
        self.with(|lib| lib.set_current_mod(name))
    }

    pub fn unset_current_mod(&self) -> Result<()> {
        self.with(|lib| {
            if !lib.current_mod.is_empty() {
                lib.remove_all_archives();
            }
            lib.current_mod.clear();
            Ok(())
        })
    }

    pub fn current_mod(&self) -> Option<String> {
        self.lock()
            .as_ref()
            .map(|lib| lib.current_mod.clone())
            .filter(|name| !name.is_empty())
    }

    /// 游戏的阵营列表
    pub fn sides(&self, mod_name: &str) -> Result<Vec<String>> {
        self.with(|lib| {
            lib.set_current_mod(mod_name)?;
            unsafe {
                let count = (lib.api.get_side_count)();
                Ok((0..count).map(|i| from_c((lib.api.get_side_name)(i))).collect())
            }
        })
    }

    // ========================================================================
    // 归档
    // ========================================================================

    pub fn add_all_archives(&self, root: &str) -> Result<()> {
        self.with(|lib| {
            let c_root = CString::new(root)?;
            unsafe { (lib.api.add_all_archives)(c_root.as_ptr()) };
            Ok(())
        })
    }

    pub fn add_archive(&self, name: &str) -> Result<()> {
        self.with(|lib| {
            let c_name = CString::new(name)?;
            unsafe { (lib.api.add_archive)(c_name.as_ptr()) };
            Ok(())
        })
    }

    /// 移除已加载的归档，库不支持时重新初始化
    pub fn remove_all_archives(&self) -> Result<()> {
        self.with(|lib| {
            lib.remove_all_archives();
            Ok(())
        })
    }

    pub fn archive_checksum(&self, vfs_path: &str) -> Result<u32> {
        self.with(|lib| {
            let c_path = CString::new(vfs_path)?;
            Ok(unsafe { (lib.api.get_archive_checksum)(c_path.as_ptr()) })
        })
    }

    pub fn archive_path(&self, name: &str) -> Result<String> {
        self.with(|lib| {
            let c_name = CString::new(name)?;
            Ok(unsafe { from_c((lib.api.get_archive_path)(c_name.as_ptr())) })
        })
    }

    pub fn open_archive(&self, name: &str) -> Result<i32> {
        self.with(|lib| {
            let c_name = CString::new(name)?;
            Ok(unsafe { (lib.api.open_archive)(c_name.as_ptr()) })
        })
    }

    pub fn close_archive(&self, archive: i32) -> Result<()> {
        self.with(|lib| {
            unsafe { (lib.api.close_archive)(archive) };
            Ok(())
        })
    }

    /// 归档中的第 `cur` 个文件，返回下一个序号（0 表示没有更多）和文件名
    pub fn find_files_archive(&self, archive: i32, cur: i32) -> Result<(i32, String)> {
        self.with(|lib| {
            let mut buf = [0u8; NAME_BUF_LEN + 1];
            let mut size = NAME_BUF_LEN as c_int;
            let next = unsafe {
                (lib.api.find_files_archive)(archive, cur, buf.as_mut_ptr().cast(), &mut size)
            };
            Ok((next, from_buf(&buf[..NAME_BUF_LEN])))
        })
    }

    /// 列出归档中的全部文件
    pub fn archive_files(&self, archive: i32) -> Result<Vec<String>> {
        let mut files = Vec::new();
        let mut cur = 0;
        loop {
            let (next, name) = self.find_files_archive(archive, cur)?;
            if next == 0 {
                return Ok(files);
            }
            files.push(name);
            cur = next;
        }
    }

    pub fn open_archive_file(&self, archive: i32, name: &str) -> Result<i32> {
        self.with(|lib| {
            let c_name = CString::new(name)?;
            Ok(unsafe { (lib.api.open_archive_file)(archive, c_name.as_ptr()) })
        })
    }

    pub fn read_archive_file(&self, archive: i32, handle: i32, buf: &mut [u8]) -> Result<i32> {
        let len = c_int::try_from(buf.len()).unwrap_or(c_int::MAX);
        self.with(|lib| {
            Ok(unsafe { (lib.api.read_archive_file)(archive, handle, buf.as_mut_ptr().cast(), len) })
        })
    }

    pub fn close_archive_file(&self, archive: i32, handle: i32) -> Result<()> {
        self.with(|lib| {
            unsafe { (lib.api.close_archive_file)(archive, handle) };
            Ok(())
        })
    }

    pub fn size_archive_file(&self, archive: i32, handle: i32) -> Result<i32> {
        self.with(|lib| Ok(unsafe { (lib.api.size_archive_file)(archive, handle) }))
    }

    // ========================================================================
    // 单位
    // ========================================================================

    pub fn unit_count(&self) -> Result<i32> {
        self.with(|lib| Ok(unsafe { (lib.api.get_unit_count)() }))
    }

    pub fn unit_name(&self, index: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_unit_name)(index)) }))
    }

    pub fn full_unit_name(&self, index: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_full_unit_name)(index)) }))
    }

    /// 处理一步单位数据，返回剩余步数
    pub fn process_units(&self) -> Result<i32> {
        self.with(|lib| Ok(unsafe { (lib.api.process_units)() }))
    }

    pub fn process_units_no_checksum(&self) -> Result<i32> {
        self.with(|lib| Ok(unsafe { (lib.api.process_units_no_checksum)() }))
    }

    // ========================================================================
    // 虚拟文件系统
    // ========================================================================

    /// 按通配符查找 VFS 中的文件
    pub fn find_files_vfs(&self, pattern: &str) -> Result<Vec<String>> {
        self.with(|lib| {
            let c_pattern = CString::new(pattern)?;
            let mut files = Vec::new();
            let mut handle = unsafe { (lib.api.init_find_vfs)(c_pattern.as_ptr()) };
            if handle == -1 {
                return Ok(files);
            }
            loop {
                let mut buf = [0u8; NAME_BUF_LEN + 1];
                handle = unsafe {
                    (lib.api.find_files_vfs)(handle, buf.as_mut_ptr().cast(), NAME_BUF_LEN as c_int)
                };
                if handle == 0 {
                    return Ok(files);
                }
                files.push(from_buf(&buf[..NAME_BUF_LEN]));
            }
        })
    }

    pub fn open_file_vfs(&self, name: &str) -> Result<i32> {
        self.with(|lib| {
            let c_name = CString::new(name)?;
            Ok(unsafe { (lib.api.open_file_vfs)(c_name.as_ptr()) })
        })
    }

    pub fn file_size_vfs(&self, handle: i32) -> Result<i32> {
        self.with(|lib| Ok(unsafe { (lib.api.file_size_vfs)(handle) }))
    }

    pub fn read_file_vfs(&self, handle: i32, buf: &mut [u8]) -> Result<i32> {
        let len = c_int::try_from(buf.len()).unwrap_or(c_int::MAX);
        self.with(|lib| Ok(unsafe { (lib.api.read_file_vfs)(handle, buf.as_mut_ptr().cast(), len) }))
    }

    pub fn close_file_vfs(&self, handle: i32) -> Result<()> {
        self.with(|lib| {
            unsafe { (lib.api.close_file_vfs)(handle) };
            Ok(())
        })
    }

    /// 读取 VFS 中一个文件的全部内容
    pub fn read_vfs_file(&self, name: &str) -> Result<Vec<u8>> {
        self.with(|lib| unsafe {
            let c_name = CString::new(name)?;
            let handle = (lib.api.open_file_vfs)(c_name.as_ptr());
            if handle == 0 {
                return Err(UnitSyncError::Call(format!("cannot open {}", name)));
            }
            let size = (lib.api.file_size_vfs)(handle).max(0);
            let mut data = vec![0u8; size as usize];
            let read = (lib.api.read_file_vfs)(handle, data.as_mut_ptr().cast(), size);
            (lib.api.close_file_vfs)(handle);
            data.truncate(read.max(0) as usize);
            Ok(data)
        })
    }

    // ========================================================================
    // AI 与可用地图
    // ========================================================================

    /// 游戏限定的可用地图数
    pub fn valid_map_count(&self, mod_name: &str) -> Result<i32> {
        self.with(|lib| {
            lib.set_current_mod(mod_name)?;
            Ok(unsafe { (lib.api.get_mod_valid_map_count)() })
        })
    }

    pub fn valid_map_name(&self, index: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_mod_valid_map)(index)) }))
    }

    pub fn lua_ai_count(&self, mod_name: &str) -> Result<i32> {
        self.with(|lib| {
            lib.set_current_mod(mod_name)?;
            Ok(unsafe { (lib.api.get_lua_ai_count)() })
        })
    }

    pub fn lua_ai_name(&self, index: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_lua_ai_name)(index)) }))
    }

    pub fn lua_ai_desc(&self, index: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_lua_ai_desc)(index)) }))
    }

    pub fn skirmish_ai_count(&self, mod_name: &str) -> Result<i32> {
        self.with(|lib| {
            lib.set_current_mod(mod_name)?;
            lib.skirmish_ai_count()
        })
    }

    /// Skirmish AI 的全部信息条目
    pub fn ai_info(&self, ai_index: i32) -> Result<Vec<AiInfoEntry>> {
        self.with(|lib| {
            let count = lib.skirmish_ai_count()?;
            let info_count = lib.api.get_skirmish_ai_info_count()?;
            let key = lib.api.get_info_key()?;
            let value = lib.api.get_info_value()?;
            let description = lib.api.get_info_description()?;
            if ai_index < 0 || ai_index >= count {
                return Err(UnitSyncError::IndexOutOfBounds { index: ai_index, count });
            }
            unsafe {
                Ok((0..info_count(ai_index))
                    .map(|i| AiInfoEntry {
                        key: from_c(key(i)),
                        value: from_c(value(i)),
                        description: from_c(description(i)),
                    })
                    .collect())
            }
        })
    }

    // ========================================================================
    // 选项
    // ========================================================================

    pub fn map_option_count(&self, map_name: &str) -> Result<i32> {
        self.with(|lib| {
            let c_name = CString::new(not_empty(map_name, "map name")?)?;
            Ok(unsafe { (lib.api.get_map_option_count)(c_name.as_ptr()) })
        })
    }

    pub fn mod_option_count(&self, mod_name: &str) -> Result<i32> {
        self.with(|lib| {
            not_empty(mod_name, "mod name")?;
            lib.set_current_mod(mod_name)?;
            Ok(unsafe { (lib.api.get_mod_option_count)() })
        })
    }

    /// 归档内自定义选项文件的选项数
    pub fn custom_option_count(&self, archive: &str, filename: &str) -> Result<i32> {
        self.with(|lib| {
            let c_archive = CString::new(not_empty(archive, "archive name")?)?;
            let c_file = CString::new(filename)?;
            let count = lib.api.get_custom_option_count()?;
            lib.remove_all_archives();
            lib.current_mod.clear();
            unsafe {
                (lib.api.add_all_archives)(c_archive.as_ptr());
                Ok(count(c_file.as_ptr()))
            }
        })
    }

    pub fn ai_option_count(&self, mod_name: &str, ai_index: i32) -> Result<i32> {
        self.with(|lib| {
            let option_count = lib.api.get_skirmish_ai_option_count()?;
            lib.set_current_mod(mod_name)?;
            let count = lib.skirmish_ai_count()?;
            if ai_index < 0 || ai_index >= count {
                return Err(UnitSyncError::IndexOutOfBounds { index: ai_index, count });
            }
            Ok(unsafe { option_count(ai_index) })
        })
    }

    pub fn option_key(&self, option: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_option_key)(option)) }))
    }

    pub fn option_name(&self, option: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_option_name)(option)) }))
    }

    pub fn option_desc(&self, option: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_option_desc)(option)) }))
    }

    pub fn option_section(&self, option: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_option_section()?)(option)) }))
    }

    pub fn option_style(&self, option: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_option_style()?)(option)) }))
    }

    pub fn option_type(&self, option: i32) -> Result<OptionType> {
        self.with(|lib| Ok(OptionType::from_raw(unsafe { (lib.api.get_option_type)(option) })))
    }

    pub fn option_bool_def(&self, option: i32) -> Result<bool> {
        self.with(|lib| Ok(unsafe { (lib.api.get_option_bool_def)(option) } != 0))
    }

    pub fn option_number_def(&self, option: i32) -> Result<f32> {
        self.with(|lib| Ok(unsafe { (lib.api.get_option_number_def)(option) }))
    }

    pub fn option_number_min(&self, option: i32) -> Result<f32> {
        self.with(|lib| Ok(unsafe { (lib.api.get_option_number_min)(option) }))
    }

    pub fn option_number_max(&self, option: i32) -> Result<f32> {
        self.with(|lib| Ok(unsafe { (lib.api.get_option_number_max)(option) }))
    }

    pub fn option_number_step(&self, option: i32) -> Result<f32> {
        self.with(|lib| Ok(unsafe { (lib.api.get_option_number_step)(option) }))
    }

    pub fn option_string_def(&self, option: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_option_string_def)(option)) }))
    }

    pub fn option_string_max_len(&self, option: i32) -> Result<i32> {
        self.with(|lib| Ok(unsafe { (lib.api.get_option_string_max_len)(option) }))
    }

    pub fn option_list_count(&self, option: i32) -> Result<i32> {
        self.with(|lib| Ok(unsafe { (lib.api.get_option_list_count)(option) }))
    }

    pub fn option_list_def(&self, option: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_option_list_def)(option)) }))
    }

    pub fn option_list_item_key(&self, option: i32, item: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_option_list_item_key)(option, item)) }))
    }

    pub fn option_list_item_name(&self, option: i32, item: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_option_list_item_name)(option, item)) }))
    }

    pub fn option_list_item_desc(&self, option: i32, item: i32) -> Result<String> {
        self.with(|lib| Ok(unsafe { from_c((lib.api.get_option_list_item_desc)(option, item)) }))
    }

    // ========================================================================
    // Spring 配置
    // ========================================================================

    pub fn spring_config_string(&self, key: &str, default: &str) -> Result<String> {
        self.with(|lib| unsafe {
            let c_key = CString::new(key)?;
            let c_default = CString::new(default)?;
            Ok(from_c((lib.api.get_spring_config_string)(c_key.as_ptr(), c_default.as_ptr())))
        })
    }

    pub fn spring_config_int(&self, key: &str, default: i32) -> Result<i32> {
        self.with(|lib| {
            let c_key = CString::new(key)?;
            Ok(unsafe { (lib.api.get_spring_config_int)(c_key.as_ptr(), default) })
        })
    }

    pub fn spring_config_float(&self, key: &str, default: f32) -> Result<f32> {
        self.with(|lib| {
            let c_key = CString::new(key)?;
            Ok(unsafe { (lib.api.get_spring_config_float)(c_key.as_ptr(), default) })
        })
    }

    pub fn set_spring_config_string(&self, key: &str, value: &str) -> Result<()> {
        self.with(|lib| {
            let c_key = CString::new(key)?;
            let c_value = CString::new(value)?;
            unsafe { (lib.api.set_spring_config_string()?)(c_key.as_ptr(), c_value.as_ptr()) };
            Ok(())
        })
    }

    pub fn set_spring_config_int(&self, key: &str, value: i32) -> Result<()> {
        self.with(|lib| {
            let c_key = CString::new(key)?;
            unsafe { (lib.api.set_spring_config_int()?)(c_key.as_ptr(), value) };
            Ok(())
        })
    }

    pub fn set_spring_config_float(&self, key: &str, value: f32) -> Result<()> {
        self.with(|lib| {
            let c_key = CString::new(key)?;
            unsafe { (lib.api.set_spring_config_float()?)(c_key.as_ptr(), value) };
            Ok(())
        })
    }
}

/// 选项类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionType {
    Undefined,
    Bool,
    List,
    Number,
    String,
    Section,
}

impl OptionType {
    fn from_raw(value: c_int) -> Self {
        match value {
            1 => Self::Bool,
            2 => Self::List,
            3 => Self::Number,
            4 => Self::String,
            5 => Self::Section,
            _ => Self::Undefined,
        }
    }
}

fn map_info_new(api: &Api, index: i32) -> Result<MapInfo> {
    let resource_count = api.get_map_resource_count()?;
    let resource_max = api.get_map_resource_max()?;
    let resource_radius = api.get_map_resource_extractor_radius()?;
    let pos_count = api.get_map_pos_count()?;
    let pos_x = api.get_map_pos_x()?;
    let pos_z = api.get_map_pos_z()?;

    unsafe {
        let (max_metal, extractor_radius) = if resource_count(index) > 0 {
            (resource_max(index, 0), resource_radius(index, 0) as f32)
        } else {
            (0.0, 0.0)
        };
        Ok(MapInfo {
            description: from_c((api.get_map_description()?)(index)),
            author: from_c((api.get_map_author()?)(index)),
            tidal_strength: (api.get_map_tidal_strength()?)(index),
            gravity: (api.get_map_gravity()?)(index),
            max_metal,
            extractor_radius,
            min_wind: (api.get_map_wind_min()?)(index),
            max_wind: (api.get_map_wind_max()?)(index),
            width: (api.get_map_width()?)(index),
            height: (api.get_map_height()?)(index),
            positions: (0..pos_count(index))
                .map(|p| StartPos {
                    x: pos_x(index, p) as i32,
                    z: pos_z(index, p) as i32,
                })
                .collect(),
        })
    }
}

fn map_info_old(api: &Api, index: i32) -> Result<MapInfo> {
    let get_info = api.get_map_info_ex()?;
    let mut description = [0u8; MAP_INFO_BUF_LEN];
    let mut author = [0u8; MAP_INFO_BUF_LEN];
    let mut raw = RawMapInfo {
        description: description.as_mut_ptr().cast(),
        tidal_strength: 0,
        gravity: 0,
        max_metal: 0.0,
        extractor_radius: 0,
        min_wind: 0,
        max_wind: 0,
        width: 0,
        height: 0,
        pos_count: 0,
        positions: [RawStartPos::default(); 16],
        author: author.as_mut_ptr().cast(),
    };

    let ok = unsafe { get_info((api.get_map_name)(index), &mut raw, 1) };
    if ok == 0 {
        return Err(UnitSyncError::Call("Failed to get map infos".to_string()));
    }

    let pos_count = raw.pos_count.clamp(0, raw.positions.len() as c_int) as usize;
    Ok(MapInfo {
        description: from_buf(&description),
        author: from_buf(&author),
        tidal_strength: raw.tidal_strength,
        gravity: raw.gravity,
        max_metal: raw.max_metal,
        extractor_radius: raw.extractor_radius as f32,
        min_wind: raw.min_wind,
        max_wind: raw.max_wind,
        width: raw.width,
        height: raw.height,
        positions: raw.positions[..pos_count]
            .iter()
            .map(|p| StartPos { x: p.x, z: p.z })
            .collect(),
    })
}

/// 临时打开一个库文件读取其 Spring 版本
fn read_spring_version(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(UnitSyncError::FileNotFound(path.to_path_buf()));
    }
    let lib = unsafe { Library::new(path) }.map_err(|e| UnitSyncError::LoadFailed(e.to_string()))?;
    unsafe {
        let get_version = lib
            .get::<unsafe extern "C" fn() -> *const c_char>(b"GetSpringVersion\0")
            .map_err(|_| UnitSyncError::FunctionMissing("GetSpringVersion"))?;
        Ok(from_c(get_version()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calls_fail_before_load() {
        let lib = UnitSyncLib::new();
        assert!(!lib.is_loaded());
        assert!(matches!(lib.spring_version(), Err(UnitSyncError::NotLoaded)));
        assert!(matches!(lib.map_count(), Err(UnitSyncError::NotLoaded)));
        assert!(matches!(lib.minimap("DeltaSiege"), Err(UnitSyncError::NotLoaded)));
        assert!(matches!(lib.sides("BA"), Err(UnitSyncError::NotLoaded)));
        assert!(matches!(lib.find_files_vfs("*.lua"), Err(UnitSyncError::NotLoaded)));
        assert!(matches!(lib.option_type(0), Err(UnitSyncError::NotLoaded)));
        assert!(matches!(lib.spring_config_int("XResolution", 0), Err(UnitSyncError::NotLoaded)));
        assert!(matches!(lib.unitsync_errors(), Err(UnitSyncError::NotLoaded)));
        assert_eq!(lib.current_mod(), None);
        assert_eq!(lib.path(), None);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libunitsync.so");
        let lib = UnitSyncLib::new();
        assert!(matches!(lib.load(&path, None), Err(UnitSyncError::FileNotFound(p)) if p == path));
        assert!(!lib.is_loaded());
    }

    #[test]
    fn test_not_a_library() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libunitsync.so");
        std::fs::write(&path, b"definitely not a shared object").unwrap();
        let lib = UnitSyncLib::new();
        assert!(matches!(lib.load(&path, None), Err(UnitSyncError::LoadFailed(_))));
        assert!(matches!(lib.map_count(), Err(UnitSyncError::NotLoaded)));
    }

    #[test]
    fn test_features_unsupported_when_unloaded() {
        let lib = UnitSyncLib::new();
        assert!(!lib.supports(Feature::InfoMap));
        assert!(!lib.supports(Feature::SettingsHandler));
    }

    #[test]
    fn test_spring_version_list_skips_bad_paths() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("garbage.so");
        std::fs::write(&garbage, b"nope").unwrap();

        let mut paths = BTreeMap::new();
        paths.insert("missing".to_string(), dir.path().join("missing.so"));
        paths.insert("garbage".to_string(), garbage);
        assert!(UnitSyncLib::new().spring_version_list(&paths).is_empty());
    }

    #[test]
    fn test_unloaded_checked_before_arguments() {
        let lib = UnitSyncLib::new();
        assert!(matches!(lib.map_option_count(""), Err(UnitSyncError::NotLoaded)));
        assert!(matches!(lib.mod_option_count(""), Err(UnitSyncError::NotLoaded)));
        assert!(matches!(lib.custom_option_count("", "EngineOptions.lua"), Err(UnitSyncError::NotLoaded)));
        assert!(matches!(lib.map_checksum_from_name("a\0b"), Err(UnitSyncError::NotLoaded)));
        assert!(matches!(lib.set_spring_config_string("a\0b", "1"), Err(UnitSyncError::NotLoaded)));
    }

    #[test]
    fn test_empty_names_rejected() {
        assert!(matches!(not_empty("", "map name"), Err(UnitSyncError::InvalidArgument(m)) if m == "empty map name"));
        assert_eq!(not_empty("DeltaSiege", "map name").unwrap(), "DeltaSiege");
    }

    #[test]
    fn test_from_buf_stops_at_nul() {
        assert_eq!(from_buf(b"maps/delta.smf\0garbage"), "maps/delta.smf");
        assert_eq!(from_buf(b"no-nul"), "no-nul");
    }

    #[test]
    fn test_option_type_from_raw() {
        assert_eq!(OptionType::from_raw(1), OptionType::Bool);
        assert_eq!(OptionType::from_raw(5), OptionType::Section);
        assert_eq!(OptionType::from_raw(42), OptionType::Undefined);
    }
}
