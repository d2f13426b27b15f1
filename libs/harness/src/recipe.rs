//! Recipe templates and their rendering into uploadable documents.
//!
//! Rendering applies, in order:
//!
//! 1. `$bucketName$`, `$testArtifactsDirectory$` and `$randomId$` textual substitution
//! 2. Placeholder renames in the top-level `ComponentDependencies` map
//! 3. The declared component name replaced by the generated cloud name in
//!    every string value and object key of the parsed document
//!
//! Keys of `ComponentDependencies` name other components and are never
//! renamed, so a component declared as `Nucleus` leaves a dependency on
//! `aws.greengrass.Nucleus` intact.

use std::path::Path;

use serde_json::Value;

use crate::error::HarnessError;

/// Replaced with the artifact bucket name.
pub const BUCKET_TOKEN: &str = "$bucketName$";

/// Replaced with the blob prefix artifacts were uploaded under.
pub const ARTIFACTS_DIR_TOKEN: &str = "$testArtifactsDirectory$";

/// Replaced with the random suffix of the packaging call.
pub const RANDOM_ID_TOKEN: &str = "$randomId$";

const NAME_FIELD: &str = "ComponentName";
const VERSION_FIELD: &str = "ComponentVersion";
const DEPENDENCIES_FIELD: &str = "ComponentDependencies";

/// Values for the textual tokens of a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Substitutions<'a> {
    pub bucket: &'a str,
    pub artifacts_dir: &'a str,
    pub random_id: &'a str,
}

impl Substitutions<'_> {
    /// Replace every token occurrence in `text`.
    ///
    /// Idempotent as long as no value itself contains a token.
    pub fn apply(&self, text: &str) -> String {
        text.replace(BUCKET_TOKEN, self.bucket)
            .replace(ARTIFACTS_DIR_TOKEN, self.artifacts_dir)
            .replace(RANDOM_ID_TOKEN, self.random_id)
    }
}

/// A recipe as read from disk or built in memory, before substitution.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeTemplate {
    origin: String,
    text: String,
    declared_name: String,
    declared_version: String,
}

impl RecipeTemplate {
    /// Read a YAML or JSON recipe file.
    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        let text = std::fs::read_to_string(path).map_err(|e| HarnessError::not_found(path, e))?;
        Self::from_text(path.display().to_string(), text)
    }

    /// Parse recipe text. `origin` names the source in error messages.
    pub fn from_text(origin: impl Into<String>, text: impl Into<String>) -> Result<Self, HarnessError> {
        let origin = origin.into();
        let text = text.into();
        let document = parse_document(&origin, &text)?;
        let (declared_name, declared_version) = identity(&origin, &document)?;

        Ok(Self {
            origin,
            text,
            declared_name,
            declared_version,
        })
    }

    /// Build a template from an in-memory recipe document.
    pub fn from_document(origin: impl Into<String>, document: &Value) -> Result<Self, HarnessError> {
        let origin = origin.into();
        let text = serde_json::to_string(document)
            .map_err(|e| HarnessError::invalid_recipe(&origin, e.to_string()))?;
        Self::from_text(origin, text)
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The raw template text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// `ComponentName` as written in the template.
    pub fn declared_name(&self) -> &str {
        &self.declared_name
    }

    /// `ComponentVersion` as written in the template.
    pub fn declared_version(&self) -> &str {
        &self.declared_version
    }

    /// Render the template for upload under `cloud_name`.
    ///
    /// `dependencies` pairs a placeholder key of `ComponentDependencies` with
    /// the cloud name it must become. Each placeholder must be declared.
    pub fn render(
        &self,
        substitutions: &Substitutions<'_>,
        dependencies: &[(String, String)],
        cloud_name: &str,
    ) -> Result<RenderedRecipe, HarnessError> {
        let text = substitutions.apply(&self.text);
        let mut document = parse_document(&self.origin, &text)?;

        if !dependencies.is_empty() {
            rewrite_dependencies(&mut document, &self.declared_name, dependencies)?;
        }

        rename_component(&mut document, &self.declared_name, cloud_name);
        let (name, version) = identity(&self.origin, &document)?;

        Ok(RenderedRecipe {
            name,
            version,
            document,
        })
    }
}

/// A recipe ready to be registered.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRecipe {
    pub name: String,
    pub version: String,
    pub document: Value,
}

impl RenderedRecipe {
    /// Dependency names declared in `ComponentDependencies`.
    pub fn dependency_names(&self) -> Vec<String> {
        self.document
            .get(DEPENDENCIES_FIELD)
            .and_then(Value::as_object)
            .map(|deps| deps.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, HarnessError> {
        serde_json::to_vec(&self.document).map_err(|e| HarnessError::invalid_recipe(&self.name, e.to_string()))
    }
}

/// Load the template under `path` for a packaging call of `name`/`version`.
///
/// The recipe must declare the version of the directory it was found in.
pub fn recipe_from_template(path: &Path, name: &str, version: &str) -> Result<RecipeTemplate, HarnessError> {
    let template = RecipeTemplate::load(path)?;
    if template.declared_version() != version {
        return Err(HarnessError::invalid_recipe(
            template.origin(),
            format!(
                "{name} recipe declares version {}, expected {version}",
                template.declared_version()
            ),
        ));
    }
    Ok(template)
}

// YAML is a superset of JSON, so one parser covers both recipe formats.
fn parse_document(origin: &str, text: &str) -> Result<Value, HarnessError> {
    let document: Value =
        serde_yaml::from_str(text).map_err(|e| HarnessError::invalid_recipe(origin, e.to_string()))?;
    if !document.is_object() {
        return Err(HarnessError::invalid_recipe(origin, "recipe is not a mapping"));
    }
    Ok(document)
}

fn identity(origin: &str, document: &Value) -> Result<(String, String), HarnessError> {
    let name = match document.get(NAME_FIELD) {
        Some(Value::String(name)) if !name.trim().is_empty() => name.clone(),
        _ => return Err(HarnessError::invalid_recipe(origin, format!("missing {NAME_FIELD}"))),
    };
    let version = match document.get(VERSION_FIELD) {
        Some(Value::String(version)) if !version.trim().is_empty() => version.clone(),
        Some(Value::Number(version)) => version.to_string(),
        _ => return Err(HarnessError::invalid_recipe(origin, format!("missing {VERSION_FIELD}"))),
    };
    Ok((name, version))
}

fn rewrite_dependencies(
    document: &mut Value,
    component: &str,
    dependencies: &[(String, String)],
) -> Result<(), HarnessError> {
    let declared = document.get_mut(DEPENDENCIES_FIELD).and_then(Value::as_object_mut);
    let Some(declared) = declared else {
        let placeholder = dependencies.first().map(|(p, _)| p.clone()).unwrap_or_default();
        return Err(HarnessError::MissingDependency {
            component: component.to_string(),
            placeholder,
        });
    };

    for (placeholder, cloud_name) in dependencies {
        let Some(spec) = declared.remove(placeholder) else {
            return Err(HarnessError::MissingDependency {
                component: component.to_string(),
                placeholder: placeholder.clone(),
            });
        };
        declared.insert(cloud_name.clone(), spec);
    }
    Ok(())
}

fn rename_component(document: &mut Value, from: &str, to: &str) {
    let Some(fields) = document.as_object_mut() else {
        return;
    };
    let dependencies = fields.remove(DEPENDENCIES_FIELD);
    rename_tokens(document, from, to);

    if let (Some(fields), Some(mut dependencies)) = (document.as_object_mut(), dependencies) {
        if let Some(entries) = dependencies.as_object_mut() {
            entries.values_mut().for_each(|spec| rename_tokens(spec, from, to));
        }
        fields.insert(DEPENDENCIES_FIELD.to_string(), dependencies);
    }
}

// Works on decoded strings, so line breaks and tabs bound a token like spaces do.
fn rename_tokens(value: &mut Value, from: &str, to: &str) {
    match value {
        Value::String(text) => *text = replace_name_tokens(text, from, to),
        Value::Array(items) => items.iter_mut().for_each(|item| rename_tokens(item, from, to)),
        Value::Object(fields) => {
            *fields = std::mem::take(fields)
                .into_iter()
                .map(|(key, mut field)| {
                    rename_tokens(&mut field, from, to);
                    (replace_name_tokens(&key, from, to), field)
                })
                .collect();
        }
        _ => {}
    }
}

fn is_name_char(c: Option<char>) -> bool {
    c.is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Replace whole-token occurrences of `from` with `to`.
///
/// An occurrence counts only if it is not embedded in a longer name, so
/// renaming component `A` leaves a key like `Artifacts` alone.
pub fn replace_name_tokens(text: &str, from: &str, to: &str) -> String {
    if from.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (idx, _) in text.match_indices(from) {
        let before = text[..idx].chars().next_back();
        let after = text[idx + from.len()..].chars().next();
        if is_name_char(before) || is_name_char(after) {
            continue;
        }
        out.push_str(&text[last..idx]);
        out.push_str(to);
        last = idx + from.len();
    }
    out.push_str(&text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    const HELLO: &str = r#"
RecipeFormatVersion: "2020-01-25"
ComponentName: HelloWorld
ComponentVersion: "1.0.0"
ComponentDescription: Prints HelloWorld to the log
Manifests:
  - Platform:
      os: linux
    Artifacts:
      - URI: "s3://$bucketName$/$testArtifactsDirectory$/hello.py"
    Lifecycle:
      Run: "python3 -u {artifacts:path}/hello.py $randomId$"
"#;

    const WITH_DEPS: &str = r#"
ComponentName: A
ComponentVersion: "1.0.0"
ComponentDependencies:
  _B_:
    VersionRequirement: ">=1.0.0"
  aws.greengrass.Nucleus:
    VersionRequirement: ">=2.0.0"
Manifests:
  - Artifacts:
      - URI: "s3://bucket/A/run.sh"
"#;

    fn subs() -> Substitutions<'static> {
        Substitutions {
            bucket: "uat-bucket",
            artifacts_dir: "artifacts/01abc",
            random_id: "01abc",
        }
    }

    #[test]
    fn test_template_identity() {
        let template = RecipeTemplate::from_text("hello", HELLO).unwrap();
        assert_eq!(template.declared_name(), "HelloWorld");
        assert_eq!(template.declared_version(), "1.0.0");
    }

    #[test]
    fn test_render_substitutes_tokens_and_name() {
        let template = RecipeTemplate::from_text("hello", HELLO).unwrap();
        let rendered = template.render(&subs(), &[], "HelloWorld-01abc").unwrap();

        assert_eq!(rendered.name, "HelloWorld-01abc");
        assert_eq!(rendered.version, "1.0.0");
        let text = rendered.document.to_string();
        assert!(text.contains("s3://uat-bucket/artifacts/01abc/hello.py"));
        assert!(text.contains("hello.py 01abc"));
        assert!(!text.contains('$'));
        // Embedded occurrence inside the description is renamed as well.
        assert!(text.contains("Prints HelloWorld-01abc to the log"));
    }

    #[test]
    fn test_dependency_rewrite_only_touches_declared_keys() {
        let template = RecipeTemplate::from_text("a", WITH_DEPS).unwrap();
        let deps = vec![("_B_".to_string(), "B-01xyz".to_string())];
        let rendered = template.render(&subs(), &deps, "A-01abc").unwrap();

        let mut names = rendered.dependency_names();
        names.sort();
        assert_eq!(names, vec!["B-01xyz", "aws.greengrass.Nucleus"]);
        assert_eq!(
            rendered.document["ComponentDependencies"]["B-01xyz"]["VersionRequirement"],
            ">=1.0.0"
        );
        // Short declared names do not clobber longer keys.
        assert!(rendered.document["Manifests"][0].get("Artifacts").is_some());
        assert_eq!(rendered.document["Manifests"][0]["Artifacts"][0]["URI"], "s3://bucket/A-01abc/run.sh");
        assert!(!rendered.document.to_string().contains("_B_"));
    }

    #[test]
    fn test_rename_reaches_line_starts_in_block_scalars() {
        let template = RecipeTemplate::from_text(
            "block",
            "ComponentName: HelloWorld\nComponentVersion: \"1.0.0\"\nManifests:\n  - Lifecycle:\n      Run: |\n        echo start\n        HelloWorld --greet\n        echo\tHelloWorld\n",
        )
        .unwrap();
        let rendered = template.render(&subs(), &[], "HelloWorld-01abc").unwrap();

        let run = rendered.document["Manifests"][0]["Lifecycle"]["Run"].as_str().unwrap();
        assert_eq!(run, "echo start\nHelloWorld-01abc --greet\necho\tHelloWorld-01abc\n");
    }

    #[test]
    fn test_dependency_keys_keep_their_names() {
        let template = RecipeTemplate::from_text(
            "nucleus",
            "ComponentName: Nucleus\nComponentVersion: \"1.0.0\"\nComponentDependencies:\n  aws.greengrass.Nucleus:\n    VersionRequirement: \">=2.0.0\"\nManifests:\n  - Lifecycle:\n      Run: echo Nucleus\n",
        )
        .unwrap();
        let rendered = template.render(&subs(), &[], "Nucleus-01abc").unwrap();

        assert_eq!(rendered.name, "Nucleus-01abc");
        assert_eq!(rendered.dependency_names(), vec!["aws.greengrass.Nucleus"]);
        assert_eq!(rendered.document["Manifests"][0]["Lifecycle"]["Run"], "echo Nucleus-01abc");
    }

    #[test]
    fn test_missing_placeholder_is_rejected() {
        let template = RecipeTemplate::from_text("a", WITH_DEPS).unwrap();
        let deps = vec![("_C_".to_string(), "C-01xyz".to_string())];
        let err = template.render(&subs(), &deps, "A-01abc").unwrap_err();
        assert!(matches!(err, HarnessError::MissingDependency { placeholder, .. } if placeholder == "_C_"));

        let template = RecipeTemplate::from_text("hello", HELLO).unwrap();
        let err = template.render(&subs(), &deps, "HelloWorld-01abc").unwrap_err();
        assert!(matches!(err, HarnessError::MissingDependency { .. }));
    }

    #[rstest]
    #[case("ComponentVersion: \"1.0.0\"", "missing ComponentName")]
    #[case("ComponentName: X", "missing ComponentVersion")]
    #[case("- just\n- a list", "not a mapping")]
    fn test_invalid_templates(#[case] text: &str, #[case] message: &str) {
        let err = RecipeTemplate::from_text("bad", text).unwrap_err();
        assert!(err.to_string().contains(message), "{err}");
    }

    #[test]
    fn test_json_recipe_accepted() {
        let template =
            RecipeTemplate::from_text("json", r#"{"ComponentName":"J","ComponentVersion":"2.1.0"}"#).unwrap();
        assert_eq!(template.declared_name(), "J");
        assert_eq!(template.declared_version(), "2.1.0");
    }

    #[rstest]
    #[case("A", "A", "A-1")]
    #[case("\"A\"", "A", "\"A-1\"")]
    #[case("Artifacts A_b bA A.b", "A", "Artifacts A_b bA A-1.b")]
    #[case("com.example.A/A", "A", "com.example.A-1/A-1")]
    #[case("nothing here", "A", "nothing here")]
    fn test_replace_name_tokens(#[case] input: &str, #[case] from: &str, #[case] expected: &str) {
        let to = format!("{from}-1");
        assert_eq!(replace_name_tokens(input, from, &to), expected);
    }

    #[test]
    fn test_recipe_from_template_checks_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("HelloWorld-1.0.0.yaml");
        std::fs::write(&path, HELLO).unwrap();

        assert!(recipe_from_template(&path, "HelloWorld", "1.0.0").is_ok());
        let err = recipe_from_template(&path, "HelloWorld", "2.0.0").unwrap_err();
        assert!(matches!(err, HarnessError::InvalidRecipe { .. }));
    }

    proptest! {
        #[test]
        fn prop_substitution_is_idempotent(
            chunks in proptest::collection::vec(
                prop_oneof![
                    "[a-zA-Z0-9 /:._-]{0,12}",
                    Just(BUCKET_TOKEN.to_string()),
                    Just(ARTIFACTS_DIR_TOKEN.to_string()),
                    Just(RANDOM_ID_TOKEN.to_string()),
                ],
                0..16,
            ),
            bucket in "[a-z0-9-]{3,20}",
            random_id in "[0-9a-z]{26}",
        ) {
            let text = chunks.concat();
            let artifacts_dir = format!("artifacts/{random_id}");
            let subs = Substitutions {
                bucket: &bucket,
                artifacts_dir: &artifacts_dir,
                random_id: &random_id,
            };

            let once = subs.apply(&text);
            prop_assert_eq!(subs.apply(&once), once.clone());
            prop_assert!(!once.contains(BUCKET_TOKEN));
            prop_assert!(!once.contains(RANDOM_ID_TOKEN));
        }
    }
}
