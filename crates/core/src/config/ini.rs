//! Ini-style record persistence
//!
//! ```text
//! ; comment
//! [GameSettings]
//! MaxPlayers=16
//! Weights[2]=0.5        element 2 of a static or dynamic array
//! +Maps=de_dust         add if not present (array or set)
//! .Maps=de_dust         add even if present
//! -Maps=de_nuke         remove matching elements
//! !Maps=                clear
//! ```
//!
//! Values are the field's text form. Only fields flagged `CONFIG` are read
//! or written.

use std::fmt;
use std::path::Path;

use crate::codec::PortContext;
use crate::error::{PropertyError, PropertyResult};
use crate::memory::{ValueBuffer, ValueMut, ValueRef};
use crate::property::{Property, PropertyFlags, PropertyKind, PropertyOps};
use crate::record::{split_index, RecordType};

use super::{ConfigError, ConfigResult, CoreConfig};

/// Default for [`ApplyOptions::max_array_len`]
pub const DEFAULT_MAX_ARRAY_LEN: usize = 16 * 1024;

/// How [`ConfigFile::apply_to`] treats its input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Fail on the first unknown key or failed line instead of skipping it
    pub strict: bool,
    /// Indexed keys past this length are rejected instead of growing the array
    pub max_array_len: usize,
}

impl ApplyOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            strict: false,
            max_array_len: DEFAULT_MAX_ARRAY_LEN,
        }
    }
}

impl From<&CoreConfig> for ApplyOptions {
    fn from(config: &CoreConfig) -> Self {
        Self {
            strict: config.strict_import,
            max_array_len: config.max_config_array_len,
        }
    }
}

/// Operation prefix of a config line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOp {
    Set,
    AddUnique,
    Add,
    Remove,
    Clear,
}

impl LineOp {
    fn split(key: &str) -> (Self, &str) {
        let op = match key.chars().next() {
            Some('+') => Self::AddUnique,
            Some('.') => Self::Add,
            Some('-') => Self::Remove,
            Some('!') => Self::Clear,
            _ => return (Self::Set, key),
        };
        (op, key[1..].trim_start())
    }

    fn prefix(self) -> &'static str {
        match self {
            Self::Set => "",
            Self::AddUnique => "+",
            Self::Add => ".",
            Self::Remove => "-",
            Self::Clear => "!",
        }
    }
}

/// One `Key=Value` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLine {
    pub op: LineOp,
    pub key: String,
    pub value: String,
}

/// A `[Section]` and its lines, in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSection {
    pub name: String,
    pub lines: Vec<ConfigLine>,
}

impl ConfigSection {
    /// Value of the last plain `Key=` line
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines
            .iter()
            .rev()
            .find(|line| line.op == LineOp::Set && line.key.eq_ignore_ascii_case(key))
            .map(|line| line.value.as_str())
    }

    /// Replace every plain line for `key` with one holding `value`
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.lines
            .retain(|line| !(line.op == LineOp::Set && line.key.eq_ignore_ascii_case(key)));
        self.lines.push(ConfigLine {
            op: LineOp::Set,
            key: key.to_string(),
            value: value.into(),
        });
    }
}

/// Parsed config file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    sections: Vec<ConfigSection>,
}

impl ConfigFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse ini text
    ///
    /// Blank lines and lines starting with `;` or `#` are ignored, as are
    /// lines before the first section or without `=`.
    pub fn parse(text: &str) -> Self {
        let mut file = Self::default();
        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                file.sections.push(ConfigSection {
                    name: name.trim().to_string(),
                    lines: Vec::new(),
                });
                continue;
            }
            let (Some(section), Some((key, value))) = (file.sections.last_mut(), line.split_once('='))
            else {
                tracing::debug!("Ignoring config line {}: '{}'", number + 1, line);
                continue;
            };
            let (op, key) = LineOp::split(key.trim());
            section.lines.push(ConfigLine {
                op,
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            });
        }
        file
    }

    /// Read and parse a file
    pub fn read(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        tracing::debug!("Read config file {:?}", path);
        Ok(Self::parse(&content))
    }

    /// Write the file, creating parent directories
    pub fn write(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_string())?;
        tracing::debug!("Wrote config file {:?}", path);
        Ok(())
    }

    pub fn sections(&self) -> &[ConfigSection] {
        &self.sections
    }

    /// Find a section by name, case-insensitively
    pub fn section(&self, name: &str) -> Option<&ConfigSection> {
        self.sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Find a section, appending an empty one if missing
    pub fn section_mut(&mut self, name: &str) -> &mut ConfigSection {
        let index = match self
            .sections
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))
        {
            Some(index) => index,
            None => {
                self.sections.push(ConfigSection {
                    name: name.to_string(),
                    lines: Vec::new(),
                });
                self.sections.len() - 1
            }
        };
        &mut self.sections[index]
    }

    // ========================================================================
    // Record persistence
    // ========================================================================

    /// Apply section `section` to a record value
    ///
    /// Lines are applied in file order. Returns the number applied. In strict
    /// mode the first unknown key or failed line is an error; otherwise it is
    /// logged and skipped.
    ///
    /// # Arguments
    /// * `section` - Section to read, usually the record type name
    /// * `record` - Record type of `dest`
    /// * `dest` - An initialized record value
    /// * `cx` - Import context
    /// * `options` - Strictness and array growth limit
    pub fn apply_to(
        &self,
        section: &str,
        record: &RecordType,
        mut dest: ValueMut<'_>,
        cx: &PortContext<'_>,
        options: &ApplyOptions,
    ) -> ConfigResult<usize> {
        let strict = options.strict;
        let Some(lines) = self.section(section) else {
            tracing::debug!("No [{}] section to apply", section);
            return Ok(0);
        };

        let mut applied = 0;
        for line in &lines.lines {
            let prop = split_index(&line.key)
                .and_then(|(name, _)| record.find_property(name))
                .filter(|prop| prop.has_any_flags(PropertyFlags::CONFIG));
            let Some(prop) = prop else {
                if strict {
                    return Err(ConfigError::UnknownKey {
                        section: section.to_string(),
                        key: line.key.clone(),
                    });
                }
                tracing::warn!("[{}] has no config field '{}'", section, line.key);
                continue;
            };

            match apply_line(prop, line, dest.reborrow(), cx, options.max_array_len) {
                Ok(()) => applied += 1,
                Err(source) if strict => {
                    return Err(ConfigError::Import {
                        key: line.key.clone(),
                        source,
                    })
                }
                Err(e) => tracing::warn!("[{}] {}{}: {}", section, line.op.prefix(), line.key, e),
            }
        }
        tracing::debug!("Applied {} config lines to [{}]", applied, section);
        Ok(applied)
    }

    /// Store every `CONFIG` field of a record value into section `section`
    ///
    /// Static arrays are written one `Key[i]=` line per element.
    pub fn store_from(
        &mut self,
        section: &str,
        record: &RecordType,
        value: ValueRef<'_>,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        let target = self.section_mut(section);
        for prop in record.properties() {
            if !prop.has_any_flags(PropertyFlags::CONFIG) {
                continue;
            }
            for index in 0..prop.array_dim() {
                let key = if prop.array_dim() > 1 {
                    format!("{}[{}]", prop.name(), index)
                } else {
                    prop.name().to_string()
                };
                let text = prop.export_text_in_container(value, index, cx)?;
                target.set(&key, text);
            }
        }
        Ok(())
    }
}

impl fmt::Display for ConfigFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "[{}]", section.name)?;
            for line in &section.lines {
                writeln!(f, "{}{}={}", line.op.prefix(), line.key, line.value)?;
            }
        }
        Ok(())
    }
}

fn apply_line(
    prop: &Property,
    line: &ConfigLine,
    mut dest: ValueMut<'_>,
    cx: &PortContext<'_>,
    max_array_len: usize,
) -> PropertyResult<()> {
    let (_, index) = split_index(&line.key).unwrap_or((line.key.as_str(), 0));
    let indexed = line.key.contains('[');

    match line.op {
        LineOp::Set if indexed && prop.array_dim() == 1 => {
            // Element of a dynamic array
            let array = prop.as_array()?;
            if index >= max_array_len {
                return Err(PropertyError::TooLarge {
                    requested: index.saturating_add(1),
                    limit: max_array_len,
                });
            }
            let mut helper = array.helper(prop.container_value_mut(dest, 0)?);
            helper.expand_for_index(index)?;
            array
                .inner()
                .import_text(&line.value, helper.try_element_mut(index)?, cx)
        }
        LineOp::Set => prop.import_text_in_container(&line.value, dest, index, cx),
        LineOp::Clear => {
            let mut field = prop.field_value_mut(dest.reborrow())?;
            prop.destroy(field.reborrow());
            prop.initialize(field);
            Ok(())
        }
        LineOp::AddUnique | LineOp::Add | LineOp::Remove => {
            let field = prop.container_value_mut(dest, index)?;
            modify_collection(prop, line.op, &line.value, field, cx)
        }
    }
}

/// Element descriptor of an array or set field
fn element_of(prop: &Property) -> PropertyResult<&Property> {
    match prop.kind() {
        PropertyKind::Array(a) => Ok(a.inner()),
        PropertyKind::Set(s) => Ok(s.element()),
        _ => prop.as_array().map(|a| a.inner()),
    }
}

fn modify_collection(
    prop: &Property,
    op: LineOp,
    text: &str,
    field: ValueMut<'_>,
    cx: &PortContext<'_>,
) -> PropertyResult<()> {
    let element = element_of(prop)?;
    let mut item = ValueBuffer::zeroed(element.element_size(), element.alignment())?;
    element.initialize(item.as_value_mut());
    let result = element
        .import_text(text, item.as_value_mut(), cx)
        .and_then(|()| modify_with(prop, op, item.as_value(), field));
    element.destroy(item.as_value_mut());
    result
}

fn modify_with(
    prop: &Property,
    op: LineOp,
    item: ValueRef<'_>,
    field: ValueMut<'_>,
) -> PropertyResult<()> {
    match prop.kind() {
        PropertyKind::Array(array) => {
            let inner = array.inner();
            let mut helper = array.helper(field);
            let matches = |helper: &crate::containers::ScriptArrayHelper<'_>| {
                (0..helper.len())
                    .filter(|&i| inner.kind().identical(helper.element(i), item))
                    .collect::<Vec<_>>()
            };
            match op {
                LineOp::AddUnique if !matches(&helper).is_empty() => {}
                LineOp::AddUnique | LineOp::Add => {
                    let index = helper.add_value();
                    inner.copy_complete(helper.element_mut(index), item);
                }
                _ => {
                    for index in matches(&helper).into_iter().rev() {
                        helper.remove_values(index, 1)?;
                    }
                }
            }
            Ok(())
        }
        PropertyKind::Set(set) => {
            let mut helper = set.helper(field);
            if op == LineOp::Remove {
                helper.remove(item)?;
            } else {
                helper.add(item)?;
            }
            Ok(())
        }
        _ => Err(PropertyError::KindMismatch {
            property: prop.name().to_string(),
            expected: "Array",
            actual: prop.kind_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::{ArrayProperty, SetProperty};
    use crate::property::{NumericProperty, StrProperty};
    use crate::record::RecordValue;
    use propsys_engine::EngineServices;
    use std::sync::Arc;

    fn settings() -> Arc<RecordType> {
        let config = PropertyFlags::CONFIG;
        let int = || PropertyKind::Int32(NumericProperty::new());
        let string = || Property::new("map", PropertyKind::Str(StrProperty));
        Arc::new(
            RecordType::new(
                "GameSettings",
                None,
                vec![
                    Property::new("MaxPlayers", int()).with_flags(config),
                    Property::new("Weights", int()).with_array_dim(3).with_flags(config),
                    Property::new("Maps", PropertyKind::Array(ArrayProperty::new(string())))
                        .with_flags(config),
                    Property::new(
                        "Modes",
                        PropertyKind::Set(SetProperty::new(string()).unwrap()),
                    )
                    .with_flags(config),
                    Property::new("Motd", PropertyKind::Str(StrProperty)).with_flags(config),
                    Property::new("Secret", int()),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_parse_and_display() {
        let text = "; header\n[A]\nx = 1\n+y=two words\n\n[B]\n!z=\nnot a line\n";
        let file = ConfigFile::parse(text);
        assert_eq!(file.sections().len(), 2);
        let a = file.section("a").unwrap();
        assert_eq!(a.get("X"), Some("1"));
        assert_eq!(a.lines[1].op, LineOp::AddUnique);
        assert_eq!(a.lines[1].value, "two words");
        assert_eq!(
            file.to_string(),
            "[A]\nx=1\n+y=two words\n\n[B]\n!z=\n"
        );
    }

    #[test]
    fn test_apply_operations() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let record = settings();
        let mut value = RecordValue::new(record.clone()).unwrap();

        let file = ConfigFile::parse(
            "[GameSettings]\n\
             MaxPlayers=16\n\
             Weights[2]=7\n\
             Maps=(de_dust,de_nuke)\n\
             +Maps=de_dust\n\
             .Maps=de_dust\n\
             -Maps=de_nuke\n\
             Maps[3]=cs_office\n\
             +Modes=casual\n\
             +Modes=casual\n\
             +Modes=arms race\n\
             -Modes=arms race\n",
        );
        let applied = file
            .apply_to("GameSettings", &record, value.as_value_mut(), &cx, &ApplyOptions::strict())
            .unwrap();
        assert_eq!(applied, 11);

        assert_eq!(value.get::<i32>("MaxPlayers", 0).unwrap(), 16);
        assert_eq!(value.get::<i32>("Weights", 2).unwrap(), 7);
        assert_eq!(
            value.export_field("Maps", 0, &cx).unwrap(),
            "(\"de_dust\",\"de_dust\",\"\",\"cs_office\")"
        );
        assert_eq!(value.export_field("Modes", 0, &cx).unwrap(), "(\"casual\")");

        let clear = ConfigFile::parse("[GameSettings]\n!Maps=\n");
        clear
            .apply_to("GameSettings", &record, value.as_value_mut(), &cx, &ApplyOptions::strict())
            .unwrap();
        assert_eq!(value.export_field("Maps", 0, &cx).unwrap(), "()");
    }

    #[test]
    fn test_strict_and_lenient() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let record = settings();
        let mut value = RecordValue::new(record.clone()).unwrap();

        let file = ConfigFile::parse("[GameSettings]\nSecret=1\nMaxPlayers=lots\nMaxPlayers=8\n");
        assert!(matches!(
            file.apply_to("GameSettings", &record, value.as_value_mut(), &cx, &ApplyOptions::strict()),
            Err(ConfigError::UnknownKey { .. })
        ));

        let applied = file
            .apply_to("GameSettings", &record, value.as_value_mut(), &cx, &ApplyOptions::default())
            .unwrap();
        assert_eq!(applied, 1);
        assert_eq!(value.get::<i32>("MaxPlayers", 0).unwrap(), 8);
        assert_eq!(value.get::<i32>("Secret", 0).unwrap(), 0);
    }

    #[test]
    fn test_store_round_trip() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let record = settings();
        let mut value = RecordValue::new(record.clone()).unwrap();
        value
            .import_text(
                "(MaxPlayers=10,Weights[1]=3,Maps=(\"a b\",c),Modes=(x),Secret=4)",
                &cx,
            )
            .unwrap();

        let mut file = ConfigFile::new();
        file.store_from("GameSettings", &record, value.as_value(), &cx)
            .unwrap();
        let section = file.section("GameSettings").unwrap();
        assert_eq!(section.get("Weights[1]"), Some("3"));
        assert_eq!(section.get("Secret"), None);

        let reparsed = ConfigFile::parse(&file.to_string());
        let mut loaded = RecordValue::new(record.clone()).unwrap();
        reparsed
            .apply_to("GameSettings", &record, loaded.as_value_mut(), &cx, &ApplyOptions::strict())
            .unwrap();
        loaded.set("Secret", 0, 4i32).unwrap();
        assert!(loaded.identical(&value));
    }

    #[test]
    fn test_store_keeps_padded_text() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let record = settings();
        let mut value = RecordValue::new(record.clone()).unwrap();
        value
            .import_field("Motd", 0, "\"  spaced  \"", &cx)
            .unwrap();

        let mut file = ConfigFile::new();
        file.store_from("GameSettings", &record, value.as_value(), &cx)
            .unwrap();
        let text = file.to_string();
        assert!(text.contains("Motd=\"  spaced  \"\n"), "{}", text);

        let mut loaded = RecordValue::new(record.clone()).unwrap();
        ConfigFile::parse(&text)
            .apply_to("GameSettings", &record, loaded.as_value_mut(), &cx, &ApplyOptions::strict())
            .unwrap();
        assert!(loaded.identical(&value));
    }

    #[test]
    fn test_indexed_key_growth_is_limited() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let record = settings();
        let mut value = RecordValue::new(record.clone()).unwrap();
        let file = ConfigFile::parse(
            "[GameSettings]\nMaps[18446744073709551615]=x\nMaps[40]=y\nMaps[1]=z\nMaxPlayers=3\n",
        );

        let err = file
            .apply_to("GameSettings", &record, value.as_value_mut(), &cx, &ApplyOptions::strict())
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Import {
                source: PropertyError::TooLarge { .. },
                ..
            }
        ));
        assert_eq!(value.export_field("Maps", 0, &cx).unwrap(), "()");

        let options = ApplyOptions {
            max_array_len: 32,
            ..ApplyOptions::default()
        };
        let applied = file
            .apply_to("GameSettings", &record, value.as_value_mut(), &cx, &options)
            .unwrap();
        assert_eq!(applied, 2);
        assert_eq!(value.export_field("Maps", 0, &cx).unwrap(), "(\"\",\"z\")");
        assert_eq!(value.get::<i32>("MaxPlayers", 0).unwrap(), 3);
    }
}
