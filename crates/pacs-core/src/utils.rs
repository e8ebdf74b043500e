//! 通用工具函数

/// 路径组件为空或不可用时的占位名
pub const UNKNOWN_COMPONENT: &str = "UNKNOWN";

/// 将属性值转换为安全的单级路径组件
///
/// 路径分隔符替换为 `_`，空值以及 `.`、`..` 替换为 [`UNKNOWN_COMPONENT`]。
/// 不做其他改写：对已清理的名称再次清理结果不变，磁盘上的目录名可以直接作为检查标识。
pub fn sanitize_component(value: &str) -> String {
    if value.is_empty() || value == "." || value == ".." {
        return UNKNOWN_COMPONENT.to_string();
    }
    value.replace(['/', '\\'], "_")
}

/// 序列子目录名：两位补零的序列号，可选追加 `_描述`
pub fn series_dir_name(series_number: i32, series_description: Option<&str>) -> String {
    let mut name = format!("{:02}", series_number);
    if let Some(desc) = series_description.map(str::trim).filter(|d| !d.is_empty()) {
        name.push('_');
        name.push_str(&desc.replace(['/', '\\'], "_"));
    }
    name
}

/// 实例文件名
///
/// UID 中包含多个 `.`，必须直接追加后缀而不能替换扩展名，否则会截断 UID。
pub fn instance_file_name(sop_instance_uid: &str) -> String {
    format!("{}.dcm", sanitize_component(sop_instance_uid))
}
