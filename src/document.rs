//! Boot config document model
//!
//! Turns the lines of a `config.txt` style file into a key/value document
//! and back. Lines the engine does not touch are dumped verbatim.
//!
//! Grammar understood here:
//!
//! ```text
//! # free comment                 kept as-is
//! [pi4]                          section header, scopes following entries
//! hdmi_group=1                   active entry
//! #hdmi_mode=4                   disabled entry
//! dtparam=audio=on,i2c_arm=off   one entry per parameter: dtparam:audio, dtparam:i2c_arm
//! ```

use std::fmt;

use crate::lines::{self, LineEnding, RawLine};

const DTPARAM_KEY: &str = "dtparam";
const DTPARAM_PREFIX: &str = "dtparam:";
const ALL_SECTION: &str = "all";

/// Values returned with `fallback` when a key is not set
const DEFAULTS: &[(&str, &str)] = &[
    ("disable_overscan", "0"),
    ("overscan_left", "0"),
    ("overscan_right", "0"),
    ("overscan_top", "0"),
    ("overscan_bottom", "0"),
    ("hdmi_group", "0"),
    ("hdmi_mode", "0"),
    ("hdmi_drive", "0"),
    ("hdmi_force_hotplug", "0"),
    ("hdmi_ignore_edid", "0"),
    ("config_hdmi_boost", "0"),
    ("sdtv_mode", "0"),
    ("sdtv_aspect", "1"),
    ("display_rotate", "0"),
    ("gpu_mem", "64"),
    ("dtparam:audio", "off"),
];

/// Selects which section's entries an operation sees
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Filter {
    /// Every entry, in or out of a section
    #[default]
    All,
    /// Only entries below the `[name]` header
    Section(String),
}

impl Filter {
    pub fn section(name: impl AsRef<str>) -> Self {
        Filter::Section(name.as_ref().trim().to_ascii_lowercase())
    }

    fn matches(&self, section: Option<&str>) -> bool {
        match self {
            Filter::All => true,
            Filter::Section(name) => section.is_some_and(|s| s.eq_ignore_ascii_case(name)),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::All => write!(f, "*"),
            Filter::Section(name) => write!(f, "[{name}]"),
        }
    }
}

/// What a name refers to: a plain key or a dtparam parameter
#[derive(Debug, Clone, Copy)]
enum Target<'a> {
    Key(&'a str),
    Param(&'a str),
}

impl<'a> Target<'a> {
    fn from_name(name: &'a str) -> Self {
        match name.strip_prefix(DTPARAM_PREFIX) {
            Some(param) => Target::Param(param),
            None => Target::Key(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Other,
    Section(String),
    Setting {
        active: bool,
        key: String,
        value: String,
    },
    DtParams {
        active: bool,
        params: Vec<(String, String)>,
    },
}

#[derive(Debug, Clone)]
struct Line {
    raw: RawLine,
    section: Option<String>,
    kind: Kind,
}

impl Line {
    fn entry(target: Target<'_>, value: &str, section: Option<String>, ending: LineEnding) -> Self {
        let kind = match target {
            Target::Key(key) => Kind::Setting {
                active: true,
                key: key.to_string(),
                value: value.to_string(),
            },
            Target::Param(param) => Kind::DtParams {
                active: true,
                params: vec![(param.to_string(), value.to_string())],
            },
        };
        let mut line = Line {
            raw: RawLine::new(String::new(), ending),
            section,
            kind,
        };
        line.render();
        line
    }

    fn header(name: &str, ending: LineEnding) -> Self {
        Line {
            raw: RawLine::new(format!("[{name}]"), ending),
            section: Some(name.to_string()),
            kind: Kind::Section(name.to_string()),
        }
    }

    /// `Some(active)` when this line defines `target`
    fn defines(&self, target: Target<'_>) -> Option<bool> {
        self.lookup(target).map(|(active, _)| active)
    }

    fn lookup(&self, target: Target<'_>) -> Option<(bool, String)> {
        match (&self.kind, target) {
            (Kind::Setting { active, key, value }, Target::Key(name)) if key == name => {
                Some((*active, value.clone()))
            }
            (Kind::DtParams { active, params }, Target::Param(name)) => params
                .iter()
                .find(|(param, _)| param == name)
                .map(|(_, value)| (*active, param_value(value))),
            _ => None,
        }
    }

    fn assign(&mut self, target: Target<'_>, new_value: &str) {
        match (&mut self.kind, target) {
            (Kind::Setting { active, value, .. }, Target::Key(_)) => {
                *active = true;
                *value = new_value.to_string();
            }
            (Kind::DtParams { active, params }, Target::Param(name)) => {
                *active = true;
                for (param, value) in params.iter_mut() {
                    if param == name {
                        *value = new_value.to_string();
                    }
                }
            }
            _ => return,
        }
        self.render();
    }

    /// A disabled line that can be switched on without enabling anything else
    fn can_reenable(&self, target: Target<'_>) -> bool {
        if self.defines(target) != Some(false) {
            return false;
        }
        match &self.kind {
            Kind::DtParams { params, .. } => params.len() == 1,
            _ => true,
        }
    }

    /// Disable `target` on this line
    ///
    /// A multi-parameter dtparam line keeps its other parameters active; the
    /// disabled parameter is returned as a separate line to insert after it.
    fn disable(&mut self, target: Target<'_>) -> Option<Line> {
        let extra = match (&mut self.kind, target) {
            (Kind::Setting { active, .. }, Target::Key(_)) => {
                *active = false;
                None
            }
            (Kind::DtParams { active, params }, Target::Param(_)) if params.len() == 1 => {
                *active = false;
                None
            }
            (Kind::DtParams { params, .. }, Target::Param(name)) => {
                let idx = params.iter().position(|(param, _)| param == name)?;
                let removed = params.remove(idx);
                let mut line = Line {
                    raw: self.raw.with_text(String::new()),
                    section: self.section.clone(),
                    kind: Kind::DtParams {
                        active: false,
                        params: vec![removed],
                    },
                };
                line.render();
                Some(line)
            }
            _ => return None,
        };
        self.render();
        extra
    }

    fn render(&mut self) {
        let marker = |active: bool| if active { "" } else { "#" };
        match &self.kind {
            Kind::Setting { active, key, value } => {
                self.raw = self.raw.with_text(format!("{}{key}={value}", marker(*active)));
            }
            Kind::DtParams { active, params } => {
                let joined = params
                    .iter()
                    .map(|(param, value)| {
                        if value.is_empty() {
                            param.clone()
                        } else {
                            format!("{param}={value}")
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                self.raw = self
                    .raw
                    .with_text(format!("{}{DTPARAM_KEY}={joined}", marker(*active)));
            }
            Kind::Other | Kind::Section(_) => {}
        }
    }
}

/// A bare dtparam (`dtparam=i2c_arm`) means "on"
fn param_value(value: &str) -> String {
    if value.is_empty() {
        "on".to_string()
    } else {
        value.to_string()
    }
}

fn is_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_params(value: &str) -> Option<Vec<(String, String)>> {
    value
        .split(',')
        .map(|part| {
            let part = part.trim();
            let (param, value) = part.split_once('=').unwrap_or((part, ""));
            let param = param.trim();
            is_key(param).then(|| (param.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn parse_kind(text: &str) -> Kind {
    let trimmed = text.trim();

    if let Some(inner) = trimmed.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        let name = inner.trim();
        if !name.is_empty() {
            return Kind::Section(name.to_ascii_lowercase());
        }
    }

    let (active, body) = match trimmed.strip_prefix('#') {
        Some(rest) => (false, rest.trim_start_matches('#').trim_start()),
        None => (true, trimmed),
    };
    let Some((key, value)) = body.split_once('=') else {
        return Kind::Other;
    };
    let key = key.trim();
    if !is_key(key) {
        return Kind::Other;
    }
    let value = value.trim();

    if key == DTPARAM_KEY {
        if let Some(params) = parse_params(value) {
            return Kind::DtParams { active, params };
        }
    }

    Kind::Setting {
        active,
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Parsed form of a boot config file
#[derive(Debug, Clone, Default)]
pub struct Document {
    lines: Vec<Line>,
    /// Ending given to lines the engine adds
    newline: LineEnding,
}

impl Document {
    /// Lines that are not valid UTF-8 are kept as opaque text
    pub fn parse<I>(lines: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<RawLine>,
    {
        let raw: Vec<RawLine> = lines.into_iter().map(Into::into).collect();
        let newline = lines::newline_of(&raw);

        let mut section = None;
        let lines = raw
            .into_iter()
            .map(|raw| {
                let kind = raw.text().map_or(Kind::Other, parse_kind);
                if let Kind::Section(name) = &kind {
                    section = Some(name.clone());
                }
                Line {
                    raw,
                    section: section.clone(),
                    kind,
                }
            })
            .collect();
        Self { lines, newline }
    }

    /// Value the engine reports for `name` when nothing sets it
    pub fn default_value(name: &str) -> Option<&'static str> {
        DEFAULTS
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
    }

    /// Look up `name` within `filter`
    ///
    /// The last active entry wins. With `ignore_comments`, a disabled entry's
    /// value is returned when no active entry exists. With `fallback`, an
    /// unset key yields the engine default, if one is known.
    pub fn get(
        &self,
        name: &str,
        filter: &Filter,
        fallback: bool,
        ignore_comments: bool,
    ) -> Option<String> {
        let target = Target::from_name(name);
        let mut active_value = None;
        let mut disabled_value = None;

        for line in self.scoped(filter) {
            match line.lookup(target) {
                Some((true, value)) => active_value = Some(value),
                Some((false, value)) => disabled_value = Some(value),
                None => {}
            }
        }

        active_value
            .or_else(|| disabled_value.filter(|_| ignore_comments))
            .or_else(|| {
                fallback
                    .then(|| Self::default_value(name).map(str::to_string))
                    .flatten()
            })
    }

    /// Set `name` within `filter`; `None` disables the key instead of deleting it
    pub fn set(&mut self, name: &str, value: Option<&str>, filter: &Filter) {
        let target = Target::from_name(name);
        match value {
            Some(value) => self.enable(target, value, filter),
            None => self.disable(target, filter),
        }
    }

    pub fn dump(&self) -> Vec<RawLine> {
        let mut out: Vec<RawLine> = self.lines.iter().map(|line| line.raw.clone()).collect();
        let last = out.len().saturating_sub(1);
        for line in &mut out[..last] {
            if line.ending() == LineEnding::Missing {
                line.set_ending(self.newline);
            }
        }
        out
    }

    fn scoped<'a>(&'a self, filter: &'a Filter) -> impl Iterator<Item = &'a Line> + 'a {
        self.lines
            .iter()
            .filter(move |line| filter.matches(line.section.as_deref()))
    }

    fn enable(&mut self, target: Target<'_>, value: &str, filter: &Filter) {
        let mut updated = false;
        for line in self.lines.iter_mut() {
            if filter.matches(line.section.as_deref()) && line.defines(target) == Some(true) {
                line.assign(target, value);
                updated = true;
            }
        }
        if updated {
            return;
        }

        if let Some(line) = self
            .lines
            .iter_mut()
            .find(|line| filter.matches(line.section.as_deref()) && line.can_reenable(target))
        {
            line.assign(target, value);
            return;
        }

        self.append(target, value, filter);
    }

    fn disable(&mut self, target: Target<'_>, filter: &Filter) {
        let mut idx = 0;
        while idx < self.lines.len() {
            let line = &mut self.lines[idx];
            if filter.matches(line.section.as_deref()) && line.defines(target) == Some(true) {
                if let Some(extra) = line.disable(target) {
                    self.lines.insert(idx + 1, extra);
                    idx += 1;
                }
            }
            idx += 1;
        }
    }

    fn append(&mut self, target: Target<'_>, value: &str, filter: &Filter) {
        match filter {
            Filter::All => {
                let last_section = self.lines.last().and_then(|line| line.section.clone());
                let section = match last_section.as_deref() {
                    None | Some(ALL_SECTION) => last_section,
                    Some(_) => {
                        self.lines.push(Line::header(ALL_SECTION, self.newline));
                        Some(ALL_SECTION.to_string())
                    }
                };
                self.lines
                    .push(Line::entry(target, value, section, self.newline));
            }
            Filter::Section(name) => {
                let line = Line::entry(target, value, Some(name.clone()), self.newline);
                match self
                    .lines
                    .iter()
                    .rposition(|line| line.section.as_deref() == Some(name.as_str()))
                {
                    Some(pos) => self.lines.insert(pos + 1, line),
                    None => {
                        self.lines.push(Line::header(name, self.newline));
                        self.lines.push(line);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[&str] = &[
        "# For more options and information see",
        "# http://rpf.io/configtxt",
        "",
        "#disable_overscan=1",
        "hdmi_group=1",
        "hdmi_mode=4",
        "dtparam=audio=on,i2c_arm",
        "",
        "[pi4]",
        "dtoverlay=vc4-fkms-v3d",
        "max_framebuffers=2",
        "",
        "[all]",
        "gpu_mem=128",
    ];

    fn doc() -> Document {
        Document::parse(SAMPLE.iter().copied())
    }

    #[test]
    fn dump_is_verbatim_without_changes() {
        assert_eq!(doc().dump(), SAMPLE);
    }

    #[test]
    fn get_active_and_dtparam_values() {
        let doc = doc();
        assert_eq!(doc.get("hdmi_group", &Filter::All, false, false), Some("1".into()));
        assert_eq!(doc.get("dtparam:audio", &Filter::All, false, false), Some("on".into()));
        assert_eq!(doc.get("dtparam:i2c_arm", &Filter::All, false, false), Some("on".into()));
        assert_eq!(doc.get("gpu_mem", &Filter::All, true, false), Some("128".into()));
    }

    #[test]
    fn get_respects_section_filter() {
        let doc = doc();
        let pi4 = Filter::section("PI4");
        assert_eq!(doc.get("max_framebuffers", &pi4, false, false), Some("2".into()));
        assert_eq!(doc.get("hdmi_group", &pi4, false, false), None);
    }

    #[test]
    fn get_disabled_entry_needs_ignore_comments() {
        let doc = doc();
        assert_eq!(doc.get("disable_overscan", &Filter::All, false, false), None);
        assert_eq!(
            doc.get("disable_overscan", &Filter::All, false, true),
            Some("1".into())
        );
        assert_eq!(
            doc.get("disable_overscan", &Filter::All, true, false),
            Some("0".into())
        );
    }

    #[test]
    fn unknown_key_without_default_is_none() {
        assert_eq!(doc().get("no_such_key", &Filter::All, true, false), None);
    }

    #[test]
    fn set_unrelated_key_preserves_other_lines() {
        let mut doc = doc();
        doc.set("hdmi_mode", Some("16"), &Filter::All);

        let dumped = doc.dump();
        assert_eq!(dumped.len(), SAMPLE.len());
        for (idx, (before, after)) in SAMPLE.iter().zip(dumped.iter()).enumerate() {
            if idx == 5 {
                assert_eq!(after, "hdmi_mode=16");
            } else {
                assert_eq!(after, before);
            }
        }
    }

    #[test]
    fn set_none_disables_but_keeps_line() {
        let mut doc = doc();
        doc.set("hdmi_group", None, &Filter::All);

        assert!(doc.dump().iter().any(|line| line == "#hdmi_group=1"));
        assert_eq!(doc.get("hdmi_group", &Filter::All, true, false), Some("0".into()));
    }

    #[test]
    fn set_reenables_disabled_entry_in_place() {
        let mut doc = doc();
        doc.set("disable_overscan", Some("1"), &Filter::All);

        assert_eq!(doc.dump()[3], "disable_overscan=1");
        assert_eq!(doc.dump().len(), SAMPLE.len());
    }

    #[test]
    fn set_new_key_appends_to_all_section() {
        let mut doc = doc();
        doc.set("sdtv_mode", Some("2"), &Filter::All);

        assert_eq!(doc.dump().last().and_then(RawLine::text), Some("sdtv_mode=2"));
    }

    #[test]
    fn set_new_key_after_other_section_adds_all_header() {
        let mut doc = Document::parse(["a=1", "[pi3]", "b=2"]);
        doc.set("c", Some("3"), &Filter::All);

        assert_eq!(doc.dump(), vec!["a=1", "[pi3]", "b=2", "[all]", "c=3"]);
    }

    #[test]
    fn set_into_section_inserts_at_section_end() {
        let mut doc = doc();
        doc.set("arm_boost", Some("1"), &Filter::section("pi4"));

        let dumped = doc.dump();
        let pos = dumped.iter().position(|l| l == "arm_boost=1").unwrap();
        assert_eq!(dumped[pos - 1], "");
        assert_eq!(dumped[pos + 1], "[all]");
    }

    #[test]
    fn set_into_missing_section_creates_it() {
        let mut doc = Document::parse(["a=1"]);
        doc.set("b", Some("2"), &Filter::section("pi0"));

        assert_eq!(doc.dump(), vec!["a=1", "[pi0]", "b=2"]);
    }

    #[test]
    fn disable_one_dtparam_splits_line() {
        let mut doc = doc();
        doc.set("dtparam:audio", None, &Filter::All);

        let dumped = doc.dump();
        assert_eq!(dumped[6], "dtparam=i2c_arm");
        assert_eq!(dumped[7], "#dtparam=audio=on");
        assert_eq!(doc.get("dtparam:audio", &Filter::All, true, false), Some("off".into()));

        doc.set("dtparam:audio", Some("on"), &Filter::All);
        assert_eq!(doc.dump()[7], "dtparam=audio=on");
    }

    #[test]
    fn metadata_comments_are_not_entries() {
        let doc = Document::parse(["### provenance: factory=1", "x=1"]);
        assert_eq!(doc.get("provenance", &Filter::All, false, true), None);
        assert_eq!(doc.dump()[0], "### provenance: factory=1");
    }

    #[test]
    fn non_utf8_lines_are_opaque_and_kept() {
        let latin1 = RawLine::from_bytes(b"# caf\xe9".to_vec(), LineEnding::Lf);
        let mut doc = Document::parse(vec![latin1.clone(), RawLine::from("hdmi_group=1")]);
        doc.set("hdmi_group", Some("2"), &Filter::All);

        let dumped = doc.dump();
        assert_eq!(dumped[0], latin1);
        assert_eq!(dumped[1], "hdmi_group=2");
    }

    #[test]
    fn added_lines_follow_crlf_and_unterminated_tail_is_closed() {
        let doc_lines = vec![
            RawLine::new("a=1", LineEnding::CrLf),
            RawLine::new("[pi4]", LineEnding::CrLf),
            RawLine::new("b=2", LineEnding::Missing),
        ];
        let mut doc = Document::parse(doc_lines);
        doc.set("c", Some("3"), &Filter::All);

        let endings: Vec<LineEnding> = doc.dump().iter().map(RawLine::ending).collect();
        assert_eq!(doc.dump(), vec!["a=1", "[pi4]", "b=2", "[all]", "c=3"]);
        assert!(endings.iter().all(|ending| *ending == LineEnding::CrLf));
    }
}
