//! Record field tags: `name[,option[,option...]]`.

const SKIP: &str = "-";

pub const OMIT_EMPTY: &str = "omitempty";
pub const STRUCT_ARRAY: &str = "structarray";
pub const SET_CUSTOM_KEYS: &str = "setcustomkeys";
pub const CUSTOM_KEY: &str = "customkey";

/// Options parsed from one field tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldTag<'t> {
    /// Name override; `None` keeps the declared field name.
    pub name: Option<&'t str>,
    pub skip: bool,
    pub omit_empty: bool,
    pub struct_array: bool,
    pub set_custom_keys: bool,
    pub custom_key: bool,
}

impl<'t> FieldTag<'t> {
    /// Parses a tag. A tag of exactly `-` skips the field, while `-,` names it `-`.
    /// Unknown options are ignored.
    pub fn parse(tag: &'t str) -> Self {
        if tag == SKIP {
            return FieldTag {
                skip: true,
                ..Default::default()
            };
        }
        let (name, options) = match tag.split_once(',') {
            Some((name, options)) => (name, options),
            None => (tag, ""),
        };
        let mut parsed = FieldTag {
            name: (!name.is_empty()).then_some(name),
            ..Default::default()
        };
        for option in options.split(',') {
            match option {
                OMIT_EMPTY => parsed.omit_empty = true,
                STRUCT_ARRAY => parsed.struct_array = true,
                SET_CUSTOM_KEYS => parsed.set_custom_keys = true,
                CUSTOM_KEY => parsed.custom_key = true,
                _ => {}
            }
        }
        parsed
    }

    /// Wire name of a field declared as `declared`.
    pub fn wire_name<'d>(&self, declared: &'d str) -> &'d str
    where
        't: 'd,
    {
        self.name.unwrap_or(declared)
    }
}
