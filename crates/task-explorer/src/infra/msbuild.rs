//! Static evaluation of MSBuild project files.
//!
//! Only the parts needed to list targets and dump properties are modelled:
//! property groups with `$(Name)` expansion, simple conditions, file imports,
//! project SDK imports resolved through a [`Toolset`], and the implicit
//! `Directory.Build.props`/`Directory.Build.targets` imports of SDK-style
//! projects. Anything the evaluator cannot resolve (uninstalled SDKs, property
//! functions, item groups) is skipped rather than treated as an error.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::domain::errors::EvaluationError;
use crate::domain::model::ProjectEvaluation;
use crate::infra::toolset::Toolset;

const MAX_IMPORT_DEPTH: usize = 32;
const DIRECTORY_BUILD_PROPS: &str = "Directory.Build.props";
const DIRECTORY_BUILD_TARGETS: &str = "Directory.Build.targets";
const SDK_PROPS: &str = "Sdk.props";
const SDK_TARGETS: &str = "Sdk.targets";

/// Evaluates project files into target lists and property sets.
#[derive(Debug, Clone)]
pub struct ProjectEvaluator {
    max_import_depth: usize,
    toolset: Toolset,
}

impl Default for ProjectEvaluator {
    fn default() -> Self {
        Self {
            max_import_depth: MAX_IMPORT_DEPTH,
            toolset: Toolset::default(),
        }
    }
}

impl ProjectEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_import_depth(mut self, depth: usize) -> Self {
        self.max_import_depth = depth;
        self
    }

    pub fn with_toolset(mut self, toolset: Toolset) -> Self {
        self.toolset = toolset;
        self
    }

    /// Evaluate `project` with the supplied global properties.
    pub fn evaluate(
        &self,
        project: &Path,
        globals: &BTreeMap<String, String>,
    ) -> Result<ProjectEvaluation, EvaluationError> {
        let mut state = EvaluationState::new(project, globals, &self.toolset);
        let root = load_project(project)?;
        let sdks = sdk_references(&root);
        let sdk_style = !sdks.is_empty();

        for sdk in &sdks {
            self.import_sdk_file(&mut state, sdk, SDK_PROPS)?;
        }
        if sdk_style && let Some(props) = find_upwards(project, DIRECTORY_BUILD_PROPS) {
            self.import(&mut state, &props, 1)?;
        }
        state.imported.insert(project.to_path_buf());
        self.evaluate_body(&mut state, &root, project, 0)?;
        for sdk in &sdks {
            self.import_sdk_file(&mut state, sdk, SDK_TARGETS)?;
        }
        if sdk_style && let Some(targets) = find_upwards(project, DIRECTORY_BUILD_TARGETS) {
            self.import(&mut state, &targets, 1)?;
        }

        tracing::debug!(
            project = %project.display(),
            targets = state.targets.len(),
            imports = state.imported.len(),
            "evaluated project"
        );
        Ok(state.finish())
    }

    fn import_sdk_file(
        &self,
        state: &mut EvaluationState<'_>,
        sdk: &str,
        file: &str,
    ) -> Result<(), EvaluationError> {
        match self.toolset.sdk_dir(sdk).map(|dir| dir.join(file)) {
            Some(path) if path.is_file() => self.import(state, &path, 1),
            _ => {
                tracing::debug!(sdk, file, "project SDK not installed, skipping");
                Ok(())
            }
        }
    }

    fn import(
        &self,
        state: &mut EvaluationState<'_>,
        path: &Path,
        depth: usize,
    ) -> Result<(), EvaluationError> {
        if depth > self.max_import_depth {
            return Err(EvaluationError::ImportDepth {
                path: state.project.clone(),
            });
        }
        if !state.imported.insert(path.to_path_buf()) {
            tracing::debug!(import = %path.display(), "skipping duplicate import");
            return Ok(());
        }
        let root = load_project(path)?;
        self.evaluate_body(state, &root, path, depth)
    }

    fn evaluate_body(
        &self,
        state: &mut EvaluationState<'_>,
        root: &Element,
        this_file: &Path,
        depth: usize,
    ) -> Result<(), EvaluationError> {
        for child in &root.children {
            match child.name.as_str() {
                "PropertyGroup" if state.condition_holds(child, this_file) => {
                    for property in &child.children {
                        if state.condition_holds(property, this_file) {
                            let value = state.expand(property.text.trim(), this_file);
                            state.set_property(&property.name, value);
                        }
                    }
                }
                "Target" => {
                    if let Some(name) = child.attribute("Name") {
                        state.add_target(name.trim());
                    }
                }
                "Import" if state.condition_holds(child, this_file) => {
                    self.follow_import(state, child, this_file, depth)?;
                }
                "ImportGroup" if state.condition_holds(child, this_file) => {
                    for import in child.children.iter().filter(|c| c.name == "Import") {
                        if state.condition_holds(import, this_file) {
                            self.follow_import(state, import, this_file, depth)?;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn follow_import(
        &self,
        state: &mut EvaluationState<'_>,
        import: &Element,
        this_file: &Path,
        depth: usize,
    ) -> Result<(), EvaluationError> {
        let Some(raw) = import.attribute("Project") else {
            return Ok(());
        };
        let expanded = state.expand(raw, this_file);
        let base = match import.attribute("Sdk") {
            Some(sdk) => match self.toolset.sdk_dir(sdk) {
                Some(dir) => dir,
                None => {
                    tracing::debug!(sdk, "project SDK not installed, skipping import");
                    return Ok(());
                }
            },
            None => this_file
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf(),
        };
        for candidate in expanded.split(';').map(str::trim).filter(|c| !c.is_empty()) {
            let path = base.join(normalize_separators(candidate));
            if path.is_file() {
                self.import(state, &path, depth + 1)?;
            } else {
                tracing::debug!(import = %path.display(), "import not found, skipping");
            }
        }
        Ok(())
    }
}

struct EvaluationState<'g> {
    project: PathBuf,
    globals: &'g BTreeMap<String, String>,
    toolset: &'g Toolset,
    /// Lower-cased name -> (declared name, value).
    properties: HashMap<String, (String, String)>,
    targets: Vec<String>,
    target_keys: HashSet<String>,
    imported: HashSet<PathBuf>,
}

impl<'g> EvaluationState<'g> {
    fn new(project: &Path, globals: &'g BTreeMap<String, String>, toolset: &'g Toolset) -> Self {
        Self {
            project: project.to_path_buf(),
            globals,
            toolset,
            properties: HashMap::new(),
            targets: Vec::new(),
            target_keys: HashSet::new(),
            imported: HashSet::new(),
        }
    }

    fn add_target(&mut self, name: &str) {
        if !name.is_empty() && self.target_keys.insert(name.to_lowercase()) {
            self.targets.push(name.to_owned());
        }
    }

    fn set_property(&mut self, name: &str, value: String) {
        let key = name.to_lowercase();
        // Global properties cannot be overridden by the project.
        if self.globals.keys().any(|g| g.to_lowercase() == key) {
            return;
        }
        self.properties.insert(key, (name.to_owned(), value));
    }

    fn lookup(&self, name: &str, this_file: &Path) -> Option<String> {
        let key = name.to_lowercase();
        if let Some((_, value)) = self.globals.iter().find(|(g, _)| g.to_lowercase() == key) {
            return Some(value.clone());
        }
        if let Some(value) = reserved_property(&key, &self.project, this_file) {
            return Some(value);
        }
        if let Some(value) = toolset_property(&key, self.toolset) {
            return Some(value);
        }
        self.properties.get(&key).map(|(_, value)| value.clone())
    }

    /// Replace `$(Name)` references; unknown properties expand to the empty string.
    fn expand(&self, raw: &str, this_file: &Path) -> String {
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(start) = rest.find("$(") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find(')') {
                Some(end) if is_property_name(&after[..end]) => {
                    if let Some(value) = self.lookup(&after[..end], this_file) {
                        out.push_str(&value);
                    }
                    rest = &after[end + 1..];
                }
                _ => {
                    out.push_str("$(");
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn condition_holds(&self, element: &Element, this_file: &Path) -> bool {
        match element.attribute("Condition") {
            None => true,
            Some(raw) => {
                let expanded = self.expand(raw, this_file);
                let base = this_file.parent().unwrap_or_else(|| Path::new("."));
                evaluate_condition(&expanded, base)
            }
        }
    }

    fn finish(self) -> ProjectEvaluation {
        let mut properties: BTreeMap<String, String> = self
            .properties
            .into_values()
            .collect();
        for (key, value) in self.globals {
            properties.insert(key.clone(), value.clone());
        }
        for name in RESERVED_PROJECT_PROPERTIES {
            if let Some(value) = reserved_property(&name.to_lowercase(), &self.project, &self.project)
            {
                properties.insert((*name).to_owned(), value);
            }
        }
        for name in TOOLSET_PROPERTIES {
            if let Some(value) = toolset_property(&name.to_lowercase(), self.toolset) {
                properties.insert((*name).to_owned(), value);
            }
        }
        ProjectEvaluation {
            targets: self.targets,
            properties,
        }
    }
}

const RESERVED_PROJECT_PROPERTIES: &[&str] = &[
    "MSBuildProjectDirectory",
    "MSBuildProjectExtension",
    "MSBuildProjectFile",
    "MSBuildProjectFullPath",
    "MSBuildProjectName",
];

fn reserved_property(key: &str, project: &Path, this_file: &Path) -> Option<String> {
    let value = match key {
        "msbuildprojectfullpath" => project.display().to_string(),
        "msbuildprojectdirectory" => project.parent()?.display().to_string(),
        "msbuildprojectname" => project.file_stem()?.to_string_lossy().into_owned(),
        "msbuildprojectfile" => project.file_name()?.to_string_lossy().into_owned(),
        "msbuildprojectextension" => format!(".{}", project.extension()?.to_string_lossy()),
        "msbuildthisfile" => this_file.file_name()?.to_string_lossy().into_owned(),
        "msbuildthisfilefullpath" => this_file.display().to_string(),
        "msbuildthisfiledirectory" => with_trailing_separator(this_file.parent()?),
        _ => return None,
    };
    Some(value)
}

const TOOLSET_PROPERTIES: &[&str] = &[
    "MSBuildBinPath",
    "MSBuildExtensionsPath",
    "MSBuildSDKsPath",
    "MSBuildToolsPath",
    "MSBuildToolsVersion",
];

fn toolset_property(key: &str, toolset: &Toolset) -> Option<String> {
    let tools = toolset.tools_path.as_ref();
    let value = match key {
        "msbuildtoolspath" | "msbuildbinpath" | "msbuildextensionspath"
        | "msbuildextensionspath32" | "msbuildextensionspath64" => tools?.display().to_string(),
        "msbuildsdkspath" => toolset.sdks_path.as_ref()?.display().to_string(),
        "msbuildtoolsversion" => {
            tools?;
            "Current".to_owned()
        }
        _ => return None,
    };
    Some(value)
}

/// `Sdk="A;B/1.0"` on the root plus `<Sdk Name="…" />` children, in order.
fn sdk_references(root: &Element) -> Vec<String> {
    let mut sdks: Vec<String> = root
        .attribute("Sdk")
        .into_iter()
        .flat_map(|value| value.split(';'))
        .map(str::trim)
        .filter(|sdk| !sdk.is_empty())
        .map(str::to_owned)
        .collect();
    sdks.extend(
        root.children
            .iter()
            .filter(|child| child.name == "Sdk")
            .filter_map(|child| child.attribute("Name"))
            .map(|name| name.trim().to_owned()),
    );
    sdks
}

pub(crate) fn with_trailing_separator(dir: &Path) -> String {
    let mut value = dir.display().to_string();
    if !value.ends_with(std::path::MAIN_SEPARATOR) {
        value.push(std::path::MAIN_SEPARATOR);
    }
    value
}

fn is_property_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Project files written on Windows use backslashes.
pub(crate) fn normalize_separators(raw: &str) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(raw)
    } else {
        PathBuf::from(raw.replace('\\', "/"))
    }
}

fn find_upwards(project: &Path, file_name: &str) -> Option<PathBuf> {
    let mut dir = project.parent();
    while let Some(current) = dir {
        let candidate = current.join(file_name);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = current.parent();
    }
    None
}

/// Supports `==`, `!=`, `Exists(..)`, `!`, `and`, `or`, and parentheses.
/// Unrecognised expressions evaluate to true so that declarations are not lost.
fn evaluate_condition(expr: &str, base: &Path) -> bool {
    let expr = strip_parens(expr.trim());
    let alternatives = split_top_level(expr, "or");
    if alternatives.len() > 1 {
        return alternatives.iter().any(|alt| evaluate_condition(alt, base));
    }
    let conjuncts = split_top_level(expr, "and");
    if conjuncts.len() > 1 {
        return conjuncts.iter().all(|part| evaluate_condition(part, base));
    }

    if let Some(inner) = expr.strip_prefix('!') {
        return !evaluate_condition(inner, base);
    }
    if expr.eq_ignore_ascii_case("true") {
        return true;
    }
    if expr.eq_ignore_ascii_case("false") {
        return false;
    }
    if let Some(args) = expr
        .get(..7)
        .filter(|head| head.eq_ignore_ascii_case("exists("))
        .and_then(|_| expr[7..].strip_suffix(')'))
    {
        let arg = unquote(args.trim());
        return !arg.is_empty() && base.join(normalize_separators(arg)).exists();
    }
    if let Some((left, right)) = split_comparison(expr, "!=") {
        return !unquote(left).eq_ignore_ascii_case(unquote(right));
    }
    if let Some((left, right)) = split_comparison(expr, "==") {
        return unquote(left).eq_ignore_ascii_case(unquote(right));
    }
    true
}

fn strip_parens(mut expr: &str) -> &str {
    while expr.starts_with('(') && expr.ends_with(')') && encloses(expr) {
        expr = expr[1..expr.len() - 1].trim();
    }
    expr
}

/// Whether the opening paren at index 0 closes at the very end.
fn encloses(expr: &str) -> bool {
    let mut depth = 0usize;
    let mut quoted = false;
    for (idx, ch) in expr.char_indices() {
        match ch {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => {
                depth = depth.saturating_sub(1);
                if depth == 0 && idx != expr.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

fn split_top_level<'a>(expr: &'a str, keyword: &str) -> Vec<&'a str> {
    let bytes = expr.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut start = 0;
    let mut idx = 0;
    while idx < bytes.len() {
        match bytes[idx] {
            b'\'' => quoted = !quoted,
            b'(' if !quoted => depth += 1,
            b')' if !quoted => depth = depth.saturating_sub(1),
            b' ' if !quoted && depth == 0 => {
                let end = idx + 1 + keyword.len();
                if end < bytes.len()
                    && bytes[end] == b' '
                    && expr
                        .get(idx + 1..end)
                        .is_some_and(|word| word.eq_ignore_ascii_case(keyword))
                {
                    parts.push(expr[start..idx].trim());
                    start = end + 1;
                    idx = end;
                }
            }
            _ => {}
        }
        idx += 1;
    }
    parts.push(expr[start..].trim());
    parts
}

fn split_comparison<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let mut quoted = false;
    for (idx, ch) in expr.char_indices() {
        if ch == '\'' {
            quoted = !quoted;
        } else if !quoted && expr[idx..].starts_with(op) {
            return Some((expr[..idx].trim(), expr[idx + op.len()..].trim()));
        }
    }
    None
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value)
}

/// Minimal element tree; only what evaluation needs.
#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

fn load_project(path: &Path) -> Result<Element, EvaluationError> {
    let contents = fs::read_to_string(path).map_err(|source| EvaluationError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let root = parse_document(&contents).map_err(|message| EvaluationError::Malformed {
        path: path.to_path_buf(),
        message,
    })?;
    if root.name != "Project" {
        return Err(EvaluationError::Malformed {
            path: path.to_path_buf(),
            message: format!("expected <Project> root element, found <{}>", root.name),
        });
    }
    Ok(root)
}

fn parse_document(contents: &str) -> Result<Element, String> {
    let mut reader = Reader::from_str(contents);
    reader.trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|err| format!("{err} at byte {}", reader.buffer_position()))?;
        match event {
            Event::Start(start) => stack.push(element_from(&start)?),
            Event::Empty(start) => {
                let element = element_from(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| "unbalanced closing tag".to_string())?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|err| err.to_string())?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current
                        .text
                        .push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err("unexpected end of document".into());
    }
    root.ok_or_else(|| "document has no root element".into())
}

fn element_from(start: &BytesStart<'_>) -> Result<Element, String> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|err| err.to_string())?;
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|err| err.to_string())?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        ..Element::default()
    })
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), String> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err("multiple root elements".into()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn globals() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("Configuration".to_string(), "Debug".to_string()),
            ("Platform".to_string(), "AnyCPU".to_string()),
        ])
    }

    #[test]
    fn collects_targets_in_declaration_order() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let project = temp.path().join("App.csproj");
        fs::write(
            &project,
            r#"<Project>
  <Target Name="Build" />
  <Target Name="Compile"><Message Text="hi" /></Target>
  <Target Name="Clean" />
  <Target Name="build" />
</Project>"#,
        )?;

        let eval = ProjectEvaluator::new().evaluate(&project, &globals())?;
        assert_eq!(eval.targets, vec!["Build", "Compile", "Clean"]);
        Ok(())
    }

    #[test]
    fn follows_relative_imports_and_skips_missing() -> Result<()> {
        let temp = tempfile::tempdir()?;
        fs::create_dir_all(temp.path().join("build"))?;
        fs::write(
            temp.path().join("build/common.targets"),
            r#"<Project><Target Name="Pack" /></Project>"#,
        )?;
        let project = temp.path().join("App.csproj");
        fs::write(
            &project,
            r#"<Project>
  <PropertyGroup><BuildDir>$(MSBuildThisFileDirectory)build</BuildDir></PropertyGroup>
  <Import Project="$(BuildDir)\common.targets" />
  <Import Project="$(MSBuildExtensionsPath)\Missing.targets" />
  <Target Name="Build" />
</Project>"#,
        )?;

        let eval = ProjectEvaluator::new().evaluate(&project, &globals())?;
        assert_eq!(eval.targets, vec!["Pack", "Build"]);
        Ok(())
    }

    #[test]
    fn import_cycles_do_not_recurse() -> Result<()> {
        let temp = tempfile::tempdir()?;
        fs::write(
            temp.path().join("a.targets"),
            r#"<Project><Import Project="b.targets" /><Target Name="A" /></Project>"#,
        )?;
        fs::write(
            temp.path().join("b.targets"),
            r#"<Project><Import Project="a.targets" /><Target Name="B" /></Project>"#,
        )?;
        let project = temp.path().join("App.proj");
        fs::write(
            &project,
            r#"<Project><Import Project="a.targets" /></Project>"#,
        )?;

        let eval = ProjectEvaluator::new().evaluate(&project, &globals())?;
        assert_eq!(eval.targets, vec!["B", "A"]);
        Ok(())
    }

    #[test]
    fn import_depth_is_bounded() -> Result<()> {
        let temp = tempfile::tempdir()?;
        for level in 0..4 {
            fs::write(
                temp.path().join(format!("{level}.targets")),
                format!(r#"<Project><Import Project="{}.targets" /></Project>"#, level + 1),
            )?;
        }
        fs::write(temp.path().join("4.targets"), "<Project />")?;
        let project = temp.path().join("App.proj");
        fs::write(&project, r#"<Project><Import Project="0.targets" /></Project>"#)?;

        let result = ProjectEvaluator::new()
            .with_max_import_depth(2)
            .evaluate(&project, &globals());
        assert!(matches!(result, Err(EvaluationError::ImportDepth { .. })));
        Ok(())
    }

    #[test]
    fn conditions_gate_properties() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let project = temp.path().join("App.csproj");
        fs::write(
            &project,
            r#"<Project>
  <PropertyGroup>
    <OutputKind>Library</OutputKind>
    <Optimize Condition="'$(Configuration)' == 'Release'">true</Optimize>
    <DebugSymbols Condition="'$(Configuration)|$(Platform)' == 'debug|anycpu'">true</DebugSymbols>
    <HasReadme Condition="Exists('README.md') or '$(OutputKind)' != 'Library'">yes</HasReadme>
  </PropertyGroup>
  <PropertyGroup Condition="'$(Configuration)' != 'Debug'">
    <Skipped>1</Skipped>
  </PropertyGroup>
  <PropertyGroup>
    <Configuration>Release</Configuration>
    <AssemblyTitle>$(MSBuildProjectName) ($(OutputKind))</AssemblyTitle>
  </PropertyGroup>
</Project>"#,
        )?;

        let eval = ProjectEvaluator::new().evaluate(&project, &globals())?;
        let props = &eval.properties;
        assert_eq!(props.get("OutputKind").map(String::as_str), Some("Library"));
        assert_eq!(props.get("DebugSymbols").map(String::as_str), Some("true"));
        assert!(!props.contains_key("Optimize"));
        assert!(!props.contains_key("HasReadme"));
        assert!(!props.contains_key("Skipped"));
        assert_eq!(props.get("Configuration").map(String::as_str), Some("Debug"));
        assert_eq!(
            props.get("AssemblyTitle").map(String::as_str),
            Some("App (Library)")
        );
        assert_eq!(props.get("MSBuildProjectName").map(String::as_str), Some("App"));
        Ok(())
    }

    #[test]
    fn sdk_projects_import_directory_build_files() -> Result<()> {
        let temp = tempfile::tempdir()?;
        fs::write(
            temp.path().join(DIRECTORY_BUILD_PROPS),
            r#"<Project><PropertyGroup><Company>Contoso</Company></PropertyGroup></Project>"#,
        )?;
        fs::write(
            temp.path().join(DIRECTORY_BUILD_TARGETS),
            r#"<Project><Target Name="Stamp" /></Project>"#,
        )?;
        fs::create_dir_all(temp.path().join("src/App"))?;
        let project = temp.path().join("src/App/App.csproj");
        fs::write(
            &project,
            r#"<Project Sdk="Microsoft.NET.Sdk"><Target Name="Publish" /></Project>"#,
        )?;

        let eval = ProjectEvaluator::new().evaluate(&project, &globals())?;
        assert_eq!(eval.targets, vec!["Publish", "Stamp"]);
        assert_eq!(eval.properties.get("Company").map(String::as_str), Some("Contoso"));
        Ok(())
    }

    #[test]
    fn sdk_imports_resolve_through_toolset() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let tools = temp.path().join("dotnet/sdk/8.0.100");
        let sdk = tools.join("Sdks/Microsoft.NET.Sdk/Sdk");
        fs::create_dir_all(&sdk)?;
        fs::write(
            sdk.join(SDK_PROPS),
            r#"<Project><PropertyGroup><OutputType>Library</OutputType></PropertyGroup></Project>"#,
        )?;
        fs::write(
            sdk.join(SDK_TARGETS),
            r#"<Project><Import Project="$(MSBuildToolsPath)\Microsoft.Common.targets" /></Project>"#,
        )?;
        fs::write(
            tools.join("Microsoft.Common.targets"),
            r#"<Project>
  <Import Project="$(MSBuildExtensionsPath)\$(MSBuildToolsVersion)\ImportAfter\*" />
  <Target Name="Build" />
  <Target Name="Rebuild" />
  <Target Name="Clean" />
  <Target Name="Publish" Condition="'$(OutputType)' == 'Exe'" />
</Project>"#,
        )?;
        fs::create_dir_all(temp.path().join("src"))?;
        let project = temp.path().join("src/App.csproj");
        fs::write(
            &project,
            r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup><TargetFramework>net8.0</TargetFramework></PropertyGroup>
  <Import Project="Sdk.props" Sdk="Microsoft.NET.Sdk" />
</Project>"#,
        )?;

        let evaluator = ProjectEvaluator::new().with_toolset(Toolset::new(Some(tools.clone()), None));
        let eval = evaluator.evaluate(&project, &globals())?;
        assert_eq!(eval.targets, vec!["Build", "Rebuild", "Clean", "Publish"]);
        assert_eq!(eval.properties.get("OutputType").map(String::as_str), Some("Library"));
        assert_eq!(
            eval.properties.get("MSBuildToolsPath").map(String::as_str),
            Some(tools.display().to_string().as_str())
        );

        let bare = ProjectEvaluator::new().evaluate(&project, &globals())?;
        assert!(bare.targets.is_empty());
        Ok(())
    }

    #[test]
    fn malformed_xml_is_an_evaluation_error() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let project = temp.path().join("Broken.csproj");
        fs::write(&project, "<Project><Target Name=\"Build\"></Project>")?;

        let result = ProjectEvaluator::new().evaluate(&project, &globals());
        assert!(matches!(result, Err(EvaluationError::Malformed { .. })));
        Ok(())
    }

    #[test]
    fn condition_grammar() {
        let base = Path::new(".");
        assert!(evaluate_condition("'a' == 'A'", base));
        assert!(!evaluate_condition("'a' != 'A'", base));
        assert!(evaluate_condition("('a' == 'b') or ('c' == 'c')", base));
        assert!(!evaluate_condition("'a' == 'a' and 'b' == 'c'", base));
        assert!(evaluate_condition("!false", base));
        assert!(evaluate_condition("'x or y' == 'x or y'", base));
        assert!(evaluate_condition("$([MSBuild]::IsOSPlatform('Windows'))", base));
    }
}
