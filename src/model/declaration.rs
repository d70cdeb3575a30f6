use std::path::Path;

use log::{debug, error};
use serde::Deserialize;
use toml::{Table, Value};

use super::{
    dep::{Checkout, Dep},
    import_path, ParseError,
};

/// One entry of the `[deps]` table, as written by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DepDeclaration {
    #[serde(skip)]
    pub key: String,
    pub import: Option<String>,
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub tag: Option<String>,
    pub source: Option<String>,
    pub scm: Option<String>,
}

impl DepDeclaration {
    pub fn to_dep(&self) -> Result<Dep, ParseError> {
        let import = self
            .import
            .clone()
            .ok_or_else(|| ParseError::MissingKey {
                declaration: self.key.clone(),
                key: "import".to_string(),
            })?;
        if !import_path::is_plain(&import) {
            return Err(ParseError::InvalidImport {
                declaration: self.key.clone(),
                import,
            });
        }

        let checkout =
            Checkout::from_fields(self.branch.clone(), self.commit.clone(), self.tag.clone())
                .ok_or_else(|| ParseError::AmbiguousCheckout {
                    declaration: self.key.clone(),
                    import: import.clone(),
                })?;

        let mut dep = Dep::new(import).with_checkout(checkout);
        if let Some(source) = &self.source {
            dep = dep.with_source(source);
        }
        if let Some(scm) = &self.scm {
            dep = dep.with_scm(scm.parse()?);
        }
        Ok(dep)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declaration {
    /// Import identifier of the project itself.
    pub repo: Option<String>,
    pub vendor: bool,
    pub deps: Vec<DepDeclaration>,
}

#[derive(Deserialize)]
struct RawDeclaration {
    repo: Option<String>,
    #[serde(default)]
    vendor: bool,
    #[serde(default)]
    deps: Table,
}

impl Declaration {
    pub fn from_file(path: &Path) -> Result<Declaration, ParseError> {
        debug!("Attempting to read declaration from {}", path.display());
        let contents = std::fs::read_to_string(path)?;

        let declaration = Declaration::from_toml_str(&contents);
        if let Err(err) = &declaration {
            error!(
                "Could not build a valid declaration from {} due to err {err}",
                path.display()
            )
        }
        declaration
    }

    pub fn from_toml_str(data: &str) -> Result<Declaration, ParseError> {
        let raw = toml::from_str::<RawDeclaration>(data)?;

        let deps = raw
            .deps
            .into_iter()
            .map(|(key, value)| parse_dep(key, value))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Declaration {
            repo: raw.repo,
            vendor: raw.vendor,
            deps,
        })
    }
}

fn parse_dep(key: String, value: Value) -> Result<DepDeclaration, ParseError> {
    let mut declaration = value.try_into::<DepDeclaration>()?;
    declaration.key = key;
    Ok(declaration)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::dep::ScmKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn load_declaration_in_order() {
        let str = r#"
            repo = "github.com/acme/app"

            [deps.zeta]
                import = "github.com/acme/zeta"
                branch = "master"
            [deps.alpha]
                import = "example.org/team/alpha.hg"
                tag = "v1.2.0"
                scm = "hg"
                source = "https://mirror.example.org/alpha"
        "#;
        let declaration = Declaration::from_toml_str(str).unwrap();
        assert_eq!(declaration.repo.as_deref(), Some("github.com/acme/app"));
        assert!(!declaration.vendor);

        let keys: Vec<_> = declaration.deps.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);

        let alpha = declaration.deps[1].to_dep().unwrap();
        assert_eq!(
            alpha,
            Dep::new("example.org/team/alpha.hg")
                .with_checkout(Checkout::Tag("v1.2.0".into()))
                .with_scm(ScmKind::Hg)
                .with_source("https://mirror.example.org/alpha")
        );
    }

    #[test]
    fn load_vendored_declaration() {
        let str = r#"
            vendor = true
            [deps.foo]
                import = "github.com/acme/foo"
        "#;
        let declaration = Declaration::from_toml_str(str).unwrap();
        assert!(declaration.vendor);
        assert_eq!(declaration.repo, None);
        assert_eq!(declaration.deps.len(), 1);
    }

    #[test]
    fn load_declaration_without_deps() {
        let declaration = Declaration::from_toml_str(r#"repo = "github.com/acme/app""#).unwrap();
        assert!(declaration.deps.is_empty());
    }

    #[test]
    fn ambiguous_checkout_names_declaration() {
        let str = r#"
            [deps.broken]
                import = "github.com/acme/broken"
                branch = "master"
                commit = "abc123"
        "#;
        let declaration = Declaration::from_toml_str(str).unwrap();
        let err = declaration.deps[0].to_dep().unwrap_err();
        assert!(matches!(
            err,
            ParseError::AmbiguousCheckout { ref declaration, .. } if declaration == "broken"
        ));
    }

    #[test]
    fn missing_import() {
        let str = r#"
            [deps.nameless]
                branch = "master"
        "#;
        let declaration = Declaration::from_toml_str(str).unwrap();
        assert!(matches!(
            declaration.deps[0].to_dep(),
            Err(ParseError::MissingKey { .. })
        ));
    }

    #[test]
    fn relative_imports_are_rejected() {
        let str = r#"
            [deps.escape]
                import = "../../precious"
            [deps.dotted]
                import = "github.com/acme/./lib"
        "#;
        let declaration = Declaration::from_toml_str(str).unwrap();
        for dep in &declaration.deps {
            assert!(matches!(
                dep.to_dep(),
                Err(ParseError::InvalidImport { ref declaration, .. }) if *declaration == dep.key
            ));
        }
    }

    #[test]
    fn invalid_scm() {
        let str = r#"
            [deps.old]
                import = "example.org/old"
                scm = "cvs"
        "#;
        let declaration = Declaration::from_toml_str(str).unwrap();
        assert!(matches!(
            declaration.deps[0].to_dep(),
            Err(ParseError::InvalidScm(_))
        ));
    }

    #[test]
    fn load_fixture_file() {
        let path = project_root::get_project_root()
            .unwrap()
            .join("resources/pinpack.toml");
        let declaration = Declaration::from_file(&path).unwrap();
        assert_eq!(declaration.repo.as_deref(), Some("github.com/acme/app"));
        assert_eq!(declaration.deps.len(), 3);
        for dep in &declaration.deps {
            dep.to_dep().unwrap();
        }
    }
}
