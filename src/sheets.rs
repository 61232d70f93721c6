use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// Label of the field holding the character's name.
pub const NAME_FIELD: &str = "Name";

// `**Label:** value`, `**Label**: value` or a bare `Label: value`
static LINE_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\*\*)?\s*([^*:#\s][^*:]*?)\s*(?:\*\*\s*:|:\s*\*\*|:)\s?(.*)$")
        .expect("valid line regex")
});
// `## Label:`, with the colon and bold markers optional
static SECTION_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(#{2,6})\s*(?:\*\*)?\s*(.+?)\s*(?:\*\*)?\s*:?\s*(?:\*\*)?\s*$")
        .expect("valid section regex")
});
static TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#\s").expect("valid title regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStyle {
    /// `**Label:** value` on a single line.
    Line,
    /// A markdown heading of the given depth followed by free text.
    Section { depth: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    Free,
    Stat,
    Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub label: String,
    pub hint: String,
    pub style: FieldStyle,
    pub required: bool,
    pub constraint: Constraint,
    pub max_len: Option<usize>,
    pub unique: bool,
}

impl FieldSpec {
    pub fn line(label: &str) -> Self {
        FieldSpec {
            label: label.to_string(),
            hint: String::new(),
            style: FieldStyle::Line,
            required: false,
            constraint: Constraint::Free,
            max_len: None,
            unique: false,
        }
    }

    pub fn section(label: &str, depth: u8) -> Self {
        FieldSpec {
            style: FieldStyle::Section { depth },
            ..FieldSpec::line(label)
        }
    }

    pub fn hint(mut self, hint: &str) -> Self {
        self.hint = hint.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn constrained(mut self, constraint: Constraint) -> Self {
        self.constraint = constraint;
        self
    }

    pub fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn optional(label: &str) -> Self {
        FieldSpec::line(label).hint("(Optional)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTemplate {
    name: String,
    fields: Vec<FieldSpec>,
}

/// Submitted sheet text split into the fields of a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSheet {
    /// Canonical label and value, in the order the fields were found.
    pub values: Vec<(String, String)>,
    pub extraneous: Vec<String>,
    pub duplicates: Vec<String>,
}

impl ParsedSheet {
    pub fn get(&self, label: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }

    fn start(&mut self, field: &FieldSpec, value: &str) -> usize {
        if let Some(index) = self.values.iter().position(|(l, _)| *l == field.label) {
            if !self.duplicates.contains(&field.label) {
                self.duplicates.push(field.label.clone());
            }
            self.values[index].1 = value.to_string();
            return index;
        }
        self.values.push((field.label.clone(), value.to_string()));
        self.values.len() - 1
    }
}

impl SheetTemplate {
    pub fn new(name: &str, fields: Vec<FieldSpec>) -> Self {
        SheetTemplate {
            name: name.to_string(),
            fields,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.label.as_str())
    }

    pub fn field(&self, label: &str) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .find(|field| field.label.eq_ignore_ascii_case(label.trim()))
    }

    pub fn title(&self) -> String {
        format!("{} Character", self.name)
    }

    /// Renders the sheet as markdown. Fields without a value show their hint.
    pub fn render<'a>(&self, value_of: impl Fn(&str) -> Option<&'a str>) -> String {
        self.render_with(value_of, true)
    }

    /// Renders the sheet leaving empty fields blank instead of hinted.
    pub fn render_compact<'a>(&self, value_of: impl Fn(&str) -> Option<&'a str>) -> String {
        self.render_with(value_of, false)
    }

    fn render_with<'a>(&self, value_of: impl Fn(&str) -> Option<&'a str>, hints: bool) -> String {
        let mut lines = vec![format!("# {}", self.title())];

        for field in &self.fields {
            let value = value_of(field.label.as_str())
                .map(str::trim)
                .filter(|value| !value.is_empty());
            let hint = Some(field.hint.as_str()).filter(|hint| hints && !hint.is_empty());

            match field.style {
                FieldStyle::Line => {
                    let shown = value.or(hint).unwrap_or_default();
                    let line = format!("**{}:** {}", field.label, shown);
                    lines.push(line.trim_end().to_string());
                }
                FieldStyle::Section { depth } => {
                    lines.push(format!("{} {}:", "#".repeat(depth as usize), field.label));
                    if let Some(value) = value.or(hint) {
                        lines.push(value.to_string());
                    }
                }
            }
        }

        lines.join("\n")
    }

    /// Renders the blank sheet a user starts from.
    pub fn render_blank(&self) -> String {
        self.render(|_| None)
    }

    /// Splits submitted sheet text back into this template's fields.
    pub fn parse(&self, text: &str) -> ParsedSheet {
        let mut sheet = ParsedSheet::default();
        // index into `sheet.values` of the field currently receiving text
        let mut current: Option<usize> = None;
        let mut in_section = false;

        for line in text.lines().map(str::trim_end) {
            if let Some(captures) = LINE_FIELD.captures(line) {
                let bold = captures.get(1).is_some();
                let label = &captures[2];
                match self.field(label) {
                    Some(field) if field.style == FieldStyle::Line => {
                        current = Some(sheet.start(field, &captures[3]));
                        in_section = false;
                        continue;
                    }
                    // a bare `word: text` line is only a field when the label is known
                    _ if in_section || !bold => {}
                    _ => {
                        sheet.extraneous.push(label.to_string());
                        current = None;
                        continue;
                    }
                }
            } else if let Some(captures) = SECTION_FIELD.captures(line) {
                let label = &captures[2];
                match self.field(label) {
                    Some(field) if matches!(field.style, FieldStyle::Section { .. }) => {
                        current = Some(sheet.start(field, ""));
                        in_section = true;
                        continue;
                    }
                    _ if in_section => {}
                    _ => {
                        sheet.extraneous.push(label.to_string());
                        current = None;
                        continue;
                    }
                }
            } else if TITLE.is_match(line) {
                continue;
            }

            if let Some(index) = current {
                let value = &mut sheet.values[index].1;
                if !value.is_empty() || !line.trim().is_empty() {
                    if !value.is_empty() {
                        value.push('\n');
                    }
                    value.push_str(line);
                }
            }
        }

        for (label, value) in sheet.values.iter_mut() {
            let trimmed = value.trim();
            let without_hint = self
                .field(label)
                .filter(|field| !field.hint.is_empty())
                .and_then(|field| trimmed.strip_prefix(field.hint.as_str()))
                .map(str::trim_start);
            *value = without_hint.unwrap_or(trimmed).to_string();
        }

        sheet
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("sheet template {name:?} does not exist")]
pub struct TemplateNotFound {
    pub name: String,
}

/// The fixed set of sheet templates, loaded once at start-up.
#[derive(Debug, Clone)]
pub struct Catalog {
    templates: Vec<Arc<SheetTemplate>>,
}

impl Catalog {
    pub fn new(templates: Vec<SheetTemplate>) -> Self {
        Catalog {
            templates: templates.into_iter().map(Arc::new).collect(),
        }
    }

    /// The community's Normal, Angel and Demon sheets.
    pub fn builtin() -> Self {
        Catalog::new(vec![normal(), angel(), demon()])
    }

    pub fn list_templates(&self) -> impl Iterator<Item = &SheetTemplate> {
        self.templates.iter().map(Arc::as_ref)
    }

    pub fn get_template(&self, name: &str) -> Result<Arc<SheetTemplate>, TemplateNotFound> {
        self.templates
            .iter()
            .find(|template| template.name.eq_ignore_ascii_case(name.trim()))
            .cloned()
            .ok_or_else(|| TemplateNotFound {
                name: name.to_string(),
            })
    }

    /// Template names containing `partial`, for autocomplete.
    pub fn suggest(&self, partial: &str) -> Vec<String> {
        let partial = partial.trim().to_lowercase();
        self.list_templates()
            .map(|template| template.name().to_string())
            .filter(|name| name.to_lowercase().contains(&partial))
            .collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog::builtin()
    }
}

const SPECIES_HINT: &str = "(If fusion, provide each name and types, max two.)";
const INHERIT_HINT: &str = "(Optional, only if you have Inherit. For Second Inherit, you can have 2 of these in a character.)";

/// Fields every sheet starts with, up to and including Sexuality.
fn identity(magic_hint: &str, equipment_hint: &str) -> Vec<FieldSpec> {
    vec![
        FieldSpec::line(NAME_FIELD).required().max_len(256).unique(),
        FieldSpec::optional("Job"),
        FieldSpec::optional("Age"),
        FieldSpec::optional("Level"),
        FieldSpec::optional("Gender"),
        FieldSpec::line("Species").hint(SPECIES_HINT).required(),
        FieldSpec::line("Kind")
            .hint("(Basic, Middle, Final, Hybrid Legendary or Pure Legendary)")
            .required()
            .constrained(Constraint::Kind),
        FieldSpec::line("Stats")
            .hint("(Optional. Eevee, Vaporeon, Jolteon, Flareon, Espeon, Umbreon, Leafeon, Glaceon or Sylveon)")
            .constrained(Constraint::Stat),
        FieldSpec::optional("Sexuality"),
        FieldSpec::line("Magic").hint(magic_hint),
        FieldSpec::line("Equipment").hint(equipment_hint),
    ]
}

fn normal() -> SheetTemplate {
    let mut fields = identity(
        "(Optional. Recommended for adventurers. Soft cap at 2-3 magics.)",
        "(Optional. Recommended for adventurers and those who fight often.)",
    );
    fields.extend([
        FieldSpec::section("Information", 2).required(),
        FieldSpec::section("Appearance", 3).required(),
        FieldSpec::line("Inherit").hint(INHERIT_HINT),
    ]);
    SheetTemplate::new("Normal", fields)
}

fn angel() -> SheetTemplate {
    let mut fields = identity(
        "(Optional. Soft cap at 2-3 magics.)",
        "(Optional. Recommended for those who fight often.)",
    );
    fields.extend([
        FieldSpec::line("Embodied Virtue").hint(
            "(Optional. Humility, Mercy, Kindness, Temperance, Diligence, Chastity or Charity; whichever the angel's personality embodies the most.)",
        ),
        FieldSpec::section("Information", 2).required(),
        FieldSpec::section("Appearance", 3).required(),
        FieldSpec::line("Inherit").hint(INHERIT_HINT),
    ]);
    SheetTemplate::new("Angel", fields)
}

fn demon() -> SheetTemplate {
    let mut fields = identity(
        "(Optional. Soft cap at 2-3 magics.)",
        "(Optional. Recommended for those who fight often.)",
    );
    fields.extend([
        FieldSpec::line("Hierarchy Rank")
            .hint("(Greater Demon, Lesser Demon or Imp; see the Heaven and Hell info.)")
            .required(),
        FieldSpec::line("Sin District")
            .hint("(Pride, Greed, Lust, Envy, Gluttony, Wrath, Sloth or none; see the Heaven and Hell info.)")
            .required(),
        FieldSpec::section("Information", 2).required(),
        FieldSpec::section("Appearance", 3).required(),
        FieldSpec::section("Disguised Appearance", 3).required(),
        FieldSpec::line("Inherit").hint(INHERIT_HINT),
    ]);
    SheetTemplate::new("Demon", fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_template() -> SheetTemplate {
        SheetTemplate::new(
            "Small",
            vec![
                FieldSpec::line("Name").required(),
                FieldSpec::line("Job").hint("(Optional)"),
                FieldSpec::section("Information", 2).required(),
            ],
        )
    }

    #[test]
    fn templates_keep_declared_labels_in_order() {
        // arrange
        let declared = vec![
            FieldSpec::line("Name"),
            FieldSpec::line("Kind").constrained(Constraint::Kind),
            FieldSpec::section("Appearance", 3),
        ];
        let catalog = Catalog::new(vec![SheetTemplate::new("Custom", declared.clone())]);

        // act
        let template = catalog.get_template("Custom").unwrap();

        // assert
        assert_eq!(template.fields(), declared.as_slice());
        assert_eq!(
            template.labels().collect::<Vec<_>>(),
            vec!["Name", "Kind", "Appearance"]
        );
    }

    #[test]
    fn builtin_catalog_lists_three_templates() {
        let catalog = Catalog::builtin();

        let names: Vec<_> = catalog.list_templates().map(SheetTemplate::name).collect();

        assert_eq!(names, vec!["Normal", "Angel", "Demon"]);
        for name in names {
            let template = catalog.get_template(name).unwrap();
            assert_eq!(template.fields()[0].label, NAME_FIELD);
        }
    }

    #[test]
    fn get_template_ignores_case() {
        let catalog = Catalog::builtin();

        assert_eq!(catalog.get_template("demon").unwrap().name(), "Demon");
    }

    #[test]
    fn unknown_template_is_not_found() {
        let catalog = Catalog::builtin();

        let error = catalog.get_template("Dragon").unwrap_err();

        assert_eq!(error.name, "Dragon");
    }

    #[test]
    fn blank_sheet_parses_to_empty_values() {
        // arrange
        let template = Catalog::builtin().get_template("Demon").unwrap();

        // act
        let sheet = template.parse(&template.render_blank());

        // assert
        assert!(sheet.extraneous.is_empty());
        assert!(sheet.duplicates.is_empty());
        assert_eq!(
            sheet.values.iter().map(|(l, _)| l.as_str()).collect::<Vec<_>>(),
            template.labels().collect::<Vec<_>>()
        );
        assert!(sheet.values.iter().all(|(_, v)| v.is_empty()));
    }

    #[test]
    fn parses_lines_and_sections() {
        let template = small_template();
        let text = "# Small Character\n**Name:** Aster\n**Job:** (Optional)\n## Information:\nLikes tea.\n\nHates rain.";

        let sheet = template.parse(text);

        assert_eq!(sheet.get("Name"), Some("Aster"));
        assert_eq!(sheet.get("Job"), Some(""));
        assert_eq!(sheet.get("Information"), Some("Likes tea.\n\nHates rain."));
    }

    #[test]
    fn labels_are_matched_case_insensitively() {
        let template = small_template();

        let sheet = template.parse("**name:** Aster\n## INFORMATION:\nQuiet.");

        assert_eq!(sheet.get("Name"), Some("Aster"));
        assert_eq!(sheet.get("Information"), Some("Quiet."));
    }

    #[test]
    fn unknown_label_outside_section_is_extraneous() {
        let template = small_template();

        let sheet = template.parse("**Name:** Aster\n**Favourite Food:** Bread");

        assert_eq!(sheet.extraneous, vec!["Favourite Food".to_string()]);
        assert_eq!(sheet.get("Name"), Some("Aster"));
    }

    #[test]
    fn unknown_label_inside_section_is_body_text() {
        let template = small_template();

        let sheet = template.parse("## Information:\n**Hobby:** Painting");

        assert!(sheet.extraneous.is_empty());
        assert_eq!(sheet.get("Information"), Some("**Hobby:** Painting"));
    }

    #[test]
    fn repeated_label_is_reported() {
        let template = small_template();

        let sheet = template.parse("**Name:** Aster\n**Name:** Bramble");

        assert_eq!(sheet.duplicates, vec!["Name".to_string()]);
        assert_eq!(sheet.get("Name"), Some("Bramble"));
    }

    #[test]
    fn line_values_continue_on_following_lines() {
        let template = small_template();

        let sheet = template.parse("**Job:** Baker\nand part-time thief");

        assert_eq!(sheet.get("Job"), Some("Baker\nand part-time thief"));
    }

    #[test]
    fn render_shows_values_and_hints() {
        let template = small_template();

        let text = template.render(|label| (label == "Name").then_some("Aster"));

        assert_eq!(
            text,
            "# Small Character\n**Name:** Aster\n**Job:** (Optional)\n## Information:"
        );
    }

    #[test]
    fn labels_may_close_bold_before_the_colon_or_skip_it() {
        // arrange
        let template = small_template();
        let text = "**Name**: Aster\nJob: Baker\n## **Information**\nQuiet.";

        // act
        let sheet = template.parse(text);

        // assert
        assert!(sheet.extraneous.is_empty());
        assert_eq!(sheet.get("Name"), Some("Aster"));
        assert_eq!(sheet.get("Job"), Some("Baker"));
        assert_eq!(sheet.get("Information"), Some("Quiet."));
    }

    #[test]
    fn bare_unknown_label_is_ordinary_text() {
        let template = small_template();

        let sheet = template.parse("**Job:** Baker\nSpecialty: rye bread");

        assert!(sheet.extraneous.is_empty());
        assert_eq!(sheet.get("Job"), Some("Baker\nSpecialty: rye bread"));
    }

    #[test]
    fn leading_hint_is_stripped_from_values() {
        let template = small_template();

        let sheet = template.parse("**Name:** Aster\n**Job:** (Optional) Baker");

        assert_eq!(sheet.get("Job"), Some("Baker"));
    }

    #[test]
    fn compact_render_leaves_empty_fields_blank() {
        let template = small_template();

        let text = template.render_compact(|label| (label == "Name").then_some("Aster"));

        assert_eq!(text, "# Small Character\n**Name:** Aster\n**Job:**\n## Information:");
        assert_eq!(template.parse(&text).get("Job"), Some(""));
    }
}
