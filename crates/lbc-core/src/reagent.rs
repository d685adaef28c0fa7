use crate::error::{Error, Result};
use std::borrow::Cow;
use std::fmt;

pub const RED_DYE: Reagent = Reagent::builtin("red_dye");
pub const GREEN_DYE: Reagent = Reagent::builtin("green_dye");
pub const BLUE_DYE: Reagent = Reagent::builtin("blue_dye");
pub const WATER: Reagent = Reagent::builtin("water");

pub static BUILTIN_REAGENTS: [Reagent; 4] = [RED_DYE, GREEN_DYE, BLUE_DYE, WATER];

/// A named substance that can be dispensed into a well.
///
/// Builtin reagents form a fixed catalog. Caller-defined reagents are any
/// other non-empty name; a custom name that matches a catalog entry resolves
/// to the builtin so equality only ever depends on the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reagent {
    name: Cow<'static, str>,
    builtin: bool,
}

impl Reagent {
    const fn builtin(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            builtin: true,
        }
    }

    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(Error::validation("reagent name must not be empty"));
        }
        if let Some(known) = Self::lookup_builtin(trimmed) {
            return Ok(known);
        }
        Ok(Self {
            name: Cow::Owned(trimmed.to_string()),
            builtin: false,
        })
    }

    pub fn lookup_builtin(name: &str) -> Option<Self> {
        BUILTIN_REAGENTS.iter().find(|r| r.name == name).cloned()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_builtin(&self) -> bool {
        self.builtin
    }
}

impl fmt::Display for Reagent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&Reagent> for Reagent {
    fn from(value: &Reagent) -> Self {
        value.clone()
    }
}

/// The dyes used by the colour-match challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dye {
    Red,
    Green,
    Blue,
}

impl Dye {
    pub fn reagent(self) -> Reagent {
        match self {
            Dye::Red => RED_DYE,
            Dye::Green => GREEN_DYE,
            Dye::Blue => BLUE_DYE,
        }
    }
}

impl From<Dye> for Reagent {
    fn from(value: Dye) -> Self {
        value.reagent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_closed() {
        let names: Vec<&str> = BUILTIN_REAGENTS.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["red_dye", "green_dye", "blue_dye", "water"]);
        assert!(BUILTIN_REAGENTS.iter().all(Reagent::is_builtin));
    }

    #[test]
    fn catalog_entries_can_be_borrowed_for_static() {
        let water: &'static Reagent = &BUILTIN_REAGENTS[3];
        assert_eq!(water, &WATER);
        assert_eq!(Reagent::lookup_builtin("water").as_ref(), Some(water));
    }

    #[test]
    fn custom_reagent_requires_a_name() {
        assert!(matches!(Reagent::new(""), Err(Error::Validation(_))));
        assert!(matches!(Reagent::new("   "), Err(Error::Validation(_))));
        let glucose = Reagent::new("glucose").expect("custom reagent");
        assert_eq!(glucose.name(), "glucose");
        assert!(!glucose.is_builtin());
    }

    #[test]
    fn custom_name_matching_catalog_resolves_to_builtin() {
        let water = Reagent::new("water").expect("water");
        assert_eq!(water, WATER);
        assert!(water.is_builtin());
    }

    #[test]
    fn dye_converts_to_builtin_reagent() {
        assert_eq!(Reagent::from(Dye::Green), GREEN_DYE);
        assert_eq!(Dye::Red.reagent().to_string(), "red_dye");
    }
}
