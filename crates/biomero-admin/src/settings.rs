//! Editable view of the BIOMERO server configuration.
//!
//! The server hands out INI sections as string maps. `MODELS` keys are
//! grouped per workflow (`cellpose`, `cellpose_repo`, `cellpose_job`,
//! `cellpose_job_mem`) and `CONVERTERS` becomes an ordered list so entries
//! can be added and removed. Every other section is edited key by key.

use std::collections::BTreeMap;

use biomero_api::payload::ConfigSections;

pub const MODELS: &str = "MODELS";
pub const CONVERTERS: &str = "CONVERTERS";
/// Written by the server on every save; never edited here.
pub const CHANGELOG: &str = "changelog";

/// Sections shown first, in this order.
const KNOWN_SECTIONS: [&str; 3] = ["SSH", "SLURM", "ANALYTICS"];

/// One workflow model in the `MODELS` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    pub name: String,
    /// Container path on `slurm_images_path` (the bare `<name>` key).
    pub path: String,
    pub repo: String,
    pub job: String,
    /// Extra job parameters, keyed without the `<name>_job_` prefix.
    pub extra: BTreeMap<String, String>,
}

/// Which part of a model a row edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelField {
    Name,
    Path,
    Repo,
    Job,
    Extra(String),
}

impl ModelField {
    pub fn label(&self) -> String {
        match self {
            Self::Name => "name".to_string(),
            Self::Path => "image path".to_string(),
            Self::Repo => "repository".to_string(),
            Self::Job => "job script".to_string(),
            Self::Extra(key) => format!("job {key}"),
        }
    }
}

impl Model {
    /// Lower case, spaces replaced, as the INI keys expect.
    pub fn normalized_name(&self) -> String {
        self.name.trim().to_lowercase().replace(char::is_whitespace, "_")
    }

    pub fn get(&self, field: &ModelField) -> String {
        match field {
            ModelField::Name => self.name.clone(),
            ModelField::Path => self.path.clone(),
            ModelField::Repo => self.repo.clone(),
            ModelField::Job => self.job.clone(),
            ModelField::Extra(key) => self.extra.get(key).cloned().unwrap_or_default(),
        }
    }

    pub fn set(&mut self, field: &ModelField, value: String) {
        match field {
            ModelField::Name => self.name = value,
            ModelField::Path => self.path = value,
            ModelField::Repo => self.repo = value,
            ModelField::Job => self.job = value,
            ModelField::Extra(key) => {
                self.extra.insert(key.clone(), value);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Converter {
    /// Conversion type such as `zarr_to_tiff`.
    pub key: String,
    /// Container image, e.g. `cellularimagingcf/convert_zarr_to_tiff:1.14.0`.
    pub value: String,
}

/// Split a `MODELS` key into its model prefix, checking `_repo` before
/// `_job` as the server does.
fn model_prefix(key: &str) -> &str {
    for suffix in ["_repo", "_job"] {
        if let Some(pos) = key.find(suffix) {
            return &key[..pos];
        }
    }
    key
}

fn group_models(section: &BTreeMap<String, String>) -> Vec<Model> {
    let mut models: BTreeMap<&str, Model> = BTreeMap::new();
    for (key, value) in section {
        let prefix = model_prefix(key);
        let model = models.entry(prefix).or_insert_with(|| Model {
            name: prefix.to_string(),
            ..Model::default()
        });
        let rest = &key[prefix.len()..];
        match rest {
            "" => model.path = value.clone(),
            "_repo" => model.repo = value.clone(),
            "_job" => model.job = value.clone(),
            _ => {
                let param = rest
                    .strip_prefix("_job_")
                    .unwrap_or(rest.trim_start_matches('_'));
                model.extra.insert(param.to_string(), value.clone());
            }
        }
    }
    models.into_values().collect()
}

/// The whole configuration in editable form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// Plain sections, edited key by key.
    pub sections: ConfigSections,
    pub models: Vec<Model>,
    pub converters: Vec<Converter>,
}

impl Settings {
    pub fn from_sections(config: &ConfigSections) -> Self {
        let mut sections = config.clone();
        let models = sections
            .remove(MODELS)
            .map(|s| group_models(&s))
            .unwrap_or_default();
        let converters = sections
            .remove(CONVERTERS)
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| Converter { key, value })
            .collect();
        sections.remove(CHANGELOG);
        Self {
            sections,
            models,
            converters,
        }
    }

    /// Plain section names in display order.
    pub fn section_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = KNOWN_SECTIONS
            .iter()
            .copied()
            .filter(|s| self.sections.contains_key(*s))
            .collect();
        names.extend(
            self.sections
                .keys()
                .map(String::as_str)
                .filter(|s| !KNOWN_SECTIONS.contains(s)),
        );
        names
    }

    pub fn setting(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section)?.get(key).map(String::as_str)
    }

    pub fn set_setting(&mut self, section: &str, key: &str, value: String) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Problems that block saving.
    pub fn validate(&self) -> Result<(), String> {
        for (i, model) in self.models.iter().enumerate() {
            if model.normalized_name().is_empty() {
                return Err(format!("Model {}: name is required", i + 1));
            }
        }
        for (i, converter) in self.converters.iter().enumerate() {
            if converter.key.trim().is_empty() {
                return Err(format!("Converter {}: key is required", i + 1));
            }
        }
        Ok(())
    }

    /// Back to the wire shape. Empty model fields are left out.
    pub fn to_sections(&self) -> ConfigSections {
        let mut config = self.sections.clone();

        let mut models = BTreeMap::new();
        for model in &self.models {
            let name = model.normalized_name();
            let mut put = |key: String, value: &str| {
                if !value.trim().is_empty() {
                    models.insert(key, value.trim().to_string());
                }
            };
            put(name.clone(), &model.path);
            put(format!("{name}_repo"), &model.repo);
            put(format!("{name}_job"), &model.job);
            for (param, value) in &model.extra {
                put(format!("{name}_job_{param}"), value);
            }
        }
        config.insert(MODELS.to_string(), models);

        let converters = self
            .converters
            .iter()
            .map(|c| (c.key.trim().to_string(), c.value.trim().to_string()))
            .collect();
        config.insert(CONVERTERS.to_string(), converters);
        config
    }
}

/// Parse `key=value` as typed into a single-line editor.
pub fn parse_pair(text: &str) -> Option<(String, String)> {
    let (key, value) = text.split_once('=')?;
    Some((key.trim().to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn config() -> ConfigSections {
        let mut config = ConfigSections::new();
        config.insert("SSH".into(), section(&[("host", "localslurm")]));
        config.insert(
            "SLURM".into(),
            section(&[("slurm_data_path", "/data/my-scratch/data")]),
        );
        config.insert(
            MODELS.into(),
            section(&[
                ("cellpose", "cellpose"),
                ("cellpose_repo", "https://github.com/TorecLuik/W_NucleiSegmentation-Cellpose/tree/v1.3.1"),
                ("cellpose_job", "jobs/cellpose.sh"),
                ("cellpose_job_mem", "15GB"),
                ("stardist_repo", "https://github.com/example/stardist"),
            ]),
        );
        config.insert(
            CONVERTERS.into(),
            section(&[("zarr_to_tiff", "cellularimagingcf/convert_zarr_to_tiff:1.14.0")]),
        );
        config.insert(CHANGELOG.into(), section(&[]));
        config
    }

    #[test]
    fn test_models_grouped_by_prefix() {
        let settings = Settings::from_sections(&config());
        assert_eq!(settings.models.len(), 2);

        let cellpose = &settings.models[0];
        assert_eq!(cellpose.name, "cellpose");
        assert_eq!(cellpose.path, "cellpose");
        assert_eq!(cellpose.job, "jobs/cellpose.sh");
        assert_eq!(cellpose.extra.get("mem").map(String::as_str), Some("15GB"));

        let stardist = &settings.models[1];
        assert_eq!(stardist.name, "stardist");
        assert!(stardist.path.is_empty());
    }

    #[test]
    fn test_sections_and_order() {
        let settings = Settings::from_sections(&config());
        assert_eq!(settings.section_names(), ["SSH", "SLURM"]);
        assert_eq!(settings.setting("SSH", "host"), Some("localslurm"));
        assert_eq!(settings.converters.len(), 1);
        assert!(!settings.sections.contains_key(CHANGELOG));
    }

    #[test]
    fn test_round_trip_without_changelog() {
        let mut expected = config();
        expected.remove(CHANGELOG);
        assert_eq!(Settings::from_sections(&config()).to_sections(), expected);
    }

    #[test]
    fn test_renamed_model_rewrites_keys() {
        let mut settings = Settings::from_sections(&config());
        settings.models[1].name = "Star Dist".into();
        settings.models[1].set(&ModelField::Extra("time".into()), "01:00:00".into());
        let config = settings.to_sections();
        let models = &config[MODELS];
        assert!(models.contains_key("star_dist_repo"));
        assert_eq!(models["star_dist_job_time"], "01:00:00");
        assert!(!models.contains_key("stardist_repo"));
        assert!(!models.contains_key("star_dist"), "empty path is left out");
    }

    #[test]
    fn test_validation() {
        let mut settings = Settings::from_sections(&config());
        assert_eq!(settings.validate(), Ok(()));

        settings.converters.push(Converter::default());
        assert_eq!(
            settings.validate(),
            Err("Converter 2: key is required".to_string())
        );
        settings.converters.pop();

        settings.models.push(Model {
            name: "  ".into(),
            ..Model::default()
        });
        assert_eq!(settings.validate(), Err("Model 3: name is required".to_string()));
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(
            parse_pair(" mem = 32GB "),
            Some(("mem".to_string(), "32GB".to_string()))
        );
        assert_eq!(parse_pair("novalue"), None);
    }
}
