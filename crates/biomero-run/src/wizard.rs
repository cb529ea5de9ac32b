//! Workflow submission wizard.
//!
//! The wizard walks `Input → Parameters → Output → Review`, then
//! `Submitting` and finally `Done` or `Failed`. Moving forward is guarded
//! per step; a failed guard leaves the wizard where it is and sets a hint.

use biomero_api::payload::RunWorkflowRequest;
use biomero_api::workflows::Workflow;
use biomero_core::keybinds::LineInput;
use biomero_core::store::NodeId;
use serde_json::{Map, Value, json};

use crate::form::ParamForm;
use crate::images::ImagePicker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    Input,
    Parameters,
    Output,
    Review,
}

impl WizardStep {
    pub const ALL: [WizardStep; 4] = [
        WizardStep::Input,
        WizardStep::Parameters,
        WizardStep::Output,
        WizardStep::Review,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Self::Input => "Input Data",
            Self::Parameters => "Parameters",
            Self::Output => "Output",
            Self::Review => "Review",
        }
    }

    fn next(self) -> Option<Self> {
        match self {
            Self::Input => Some(Self::Parameters),
            Self::Parameters => Some(Self::Output),
            Self::Output => Some(Self::Review),
            Self::Review => None,
        }
    }

    fn prev(self) -> Option<Self> {
        match self {
            Self::Input => None,
            Self::Parameters => Some(Self::Input),
            Self::Output => Some(Self::Parameters),
            Self::Review => Some(Self::Output),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardState {
    Editing(WizardStep),
    Submitting,
    Done(String),
    Failed(String),
}

// ── Output options ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputField {
    ReceiveEmail,
    ImportAsZip,
    UploadCsv,
    AttachToOriginalImages,
    DatasetName,
    RenamePattern,
}

impl OutputField {
    pub const ALL: [OutputField; 6] = [
        OutputField::ReceiveEmail,
        OutputField::ImportAsZip,
        OutputField::UploadCsv,
        OutputField::AttachToOriginalImages,
        OutputField::DatasetName,
        OutputField::RenamePattern,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::ReceiveEmail => "E-mail on completion",
            Self::ImportAsZip => "Zip attachment to parent",
            Self::UploadCsv => "Upload result CSVs as tables",
            Self::AttachToOriginalImages => "Attach to original images",
            Self::DatasetName => "Import into new dataset",
            Self::RenamePattern => "Rename imported images",
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::DatasetName | Self::RenamePattern)
    }
}

/// Where and how results come back into OMERO.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputOptions {
    pub receive_email: bool,
    pub import_as_zip: bool,
    pub upload_csv: bool,
    pub attach_to_original_images: bool,
    pub dataset_name: LineInput,
    pub rename_pattern: LineInput,
    pub cursor: usize,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            receive_email: true,
            import_as_zip: true,
            upload_csv: true,
            attach_to_original_images: false,
            dataset_name: LineInput::default(),
            rename_pattern: LineInput::default(),
            cursor: 0,
        }
    }
}

impl OutputOptions {
    pub fn current(&self) -> OutputField {
        OutputField::ALL[self.cursor.min(OutputField::ALL.len() - 1)]
    }

    pub fn move_down(&mut self) {
        if self.cursor + 1 < OutputField::ALL.len() {
            self.cursor += 1;
        }
    }

    pub fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn has_dataset(&self) -> bool {
        !self.dataset_name.text.trim().is_empty()
    }

    /// The rename pattern only applies to images imported into a new dataset.
    pub fn is_editable(&self, field: OutputField) -> bool {
        field != OutputField::RenamePattern || self.has_dataset()
    }

    pub fn flag(&self, field: OutputField) -> Option<bool> {
        match field {
            OutputField::ReceiveEmail => Some(self.receive_email),
            OutputField::ImportAsZip => Some(self.import_as_zip),
            OutputField::UploadCsv => Some(self.upload_csv),
            OutputField::AttachToOriginalImages => Some(self.attach_to_original_images),
            _ => None,
        }
    }

    /// Flip the flag under the cursor. Returns false on text fields.
    pub fn toggle_current(&mut self) -> bool {
        let flag = match self.current() {
            OutputField::ReceiveEmail => &mut self.receive_email,
            OutputField::ImportAsZip => &mut self.import_as_zip,
            OutputField::UploadCsv => &mut self.upload_csv,
            OutputField::AttachToOriginalImages => &mut self.attach_to_original_images,
            _ => return false,
        };
        *flag = !*flag;
        true
    }

    /// Text buffer of the field under the cursor, if it is editable text.
    pub fn current_text_mut(&mut self) -> Option<&mut LineInput> {
        let field = self.current();
        if !self.is_editable(field) {
            return None;
        }
        match field {
            OutputField::DatasetName => Some(&mut self.dataset_name),
            OutputField::RenamePattern => Some(&mut self.rename_pattern),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.rename_pattern.text.trim().is_empty() && !self.has_dataset() {
            return Err("A rename pattern needs an output dataset".to_string());
        }
        Ok(())
    }

    fn insert_params(&self, params: &mut Map<String, Value>) {
        let dataset = self.dataset_name.text.trim();
        let datasets: Vec<&str> = if dataset.is_empty() { vec![] } else { vec![dataset] };
        let rename = if dataset.is_empty() {
            ""
        } else {
            self.rename_pattern.text.trim()
        };
        params.insert("receiveEmail".into(), json!(self.receive_email));
        params.insert("importAsZip".into(), json!(self.import_as_zip));
        params.insert("uploadCsv".into(), json!(self.upload_csv));
        params.insert(
            "attachToOriginalImages".into(),
            json!(self.attach_to_original_images),
        );
        params.insert("selectedDatasets".into(), json!(datasets));
        params.insert("renamePattern".into(), json!(rename));
    }
}

// ── Wizard ───────────────────────────────────────────────────────────

pub struct Wizard {
    pub workflow: Workflow,
    pub state: WizardState,
    /// Input dataset node ids, in selection order.
    pub datasets: Vec<NodeId>,
    pub images: ImagePicker,
    pub form: ParamForm,
    pub output: OutputOptions,
    /// Why the last step change was refused.
    pub hint: Option<String>,
}

impl Wizard {
    pub fn new(workflow: Workflow) -> Self {
        let form = ParamForm::from_metadata(&workflow.metadata);
        Self {
            workflow,
            state: WizardState::Editing(WizardStep::Input),
            datasets: Vec::new(),
            images: ImagePicker::new(),
            form,
            output: OutputOptions::default(),
            hint: None,
        }
    }

    pub fn step(&self) -> Option<WizardStep> {
        match self.state {
            WizardState::Editing(step) => Some(step),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, WizardState::Done(_) | WizardState::Failed(_))
    }

    /// Guard for leaving `step` forward.
    pub fn check(&self, step: WizardStep) -> Result<(), String> {
        match step {
            WizardStep::Input => {
                if self.images.selected_count() == 0 {
                    Err("Select at least one image".to_string())
                } else {
                    Ok(())
                }
            }
            WizardStep::Parameters => self.form.validate(),
            WizardStep::Output => self.output.validate(),
            WizardStep::Review => WizardStep::ALL[..3]
                .iter()
                .try_for_each(|s| self.check(*s)),
        }
    }

    /// Advance one step. Returns false (with a hint) when the guard fails or
    /// there is no next step.
    pub fn next(&mut self) -> bool {
        let Some(step) = self.step() else {
            return false;
        };
        if let Err(hint) = self.check(step) {
            self.hint = Some(hint);
            return false;
        }
        match step.next() {
            Some(next) => {
                self.hint = None;
                self.state = WizardState::Editing(next);
                true
            }
            None => false,
        }
    }

    /// Go back one step. A failed submission returns to Review.
    pub fn back(&mut self) -> bool {
        let target = match &self.state {
            WizardState::Editing(step) => step.prev(),
            WizardState::Failed(_) => Some(WizardStep::Review),
            WizardState::Submitting | WizardState::Done(_) => None,
        };
        match target {
            Some(step) => {
                self.hint = None;
                self.state = WizardState::Editing(step);
                true
            }
            None => false,
        }
    }

    /// The request as it would be submitted now.
    pub fn build_request(&self) -> RunWorkflowRequest {
        let mut params = self.form.values();
        params.insert("IDs".into(), json!(self.images.selected_ids()));
        params.insert("Data_Type".into(), json!("Image"));
        self.output.insert_params(&mut params);
        if let Some(version) = self.workflow.metadata.version() {
            params.insert("version".into(), json!(version));
        }
        RunWorkflowRequest {
            workflow_name: self.workflow.name.clone(),
            params,
        }
    }

    /// Leave Review for Submitting. Only allowed from Review with every
    /// guard passing.
    pub fn begin_submit(&mut self) -> Result<RunWorkflowRequest, String> {
        if self.step() != Some(WizardStep::Review) {
            return Err("Review the workflow before submitting".to_string());
        }
        if let Err(hint) = self.check(WizardStep::Review) {
            self.hint = Some(hint.clone());
            return Err(hint);
        }
        self.hint = None;
        self.state = WizardState::Submitting;
        Ok(self.build_request())
    }

    /// Record the server's answer. Ignored unless a submission is running.
    pub fn finish(&mut self, result: Result<String, String>) {
        if self.state != WizardState::Submitting {
            return;
        }
        self.state = match result {
            Ok(message) => WizardState::Done(message),
            Err(message) => WizardState::Failed(message),
        };
    }

    /// Key/value lines for the Review step.
    pub fn summary(&self) -> Vec<(String, String)> {
        let mut lines = vec![
            ("Workflow".to_string(), self.workflow.name.clone()),
            (
                "Version".to_string(),
                self.workflow
                    .metadata
                    .version()
                    .unwrap_or("latest")
                    .to_string(),
            ),
            ("Datasets".to_string(), self.datasets.len().to_string()),
            (
                "Images".to_string(),
                format!(
                    "{} of {}",
                    self.images.selected_count(),
                    self.images.images().len()
                ),
            ),
        ];
        lines.extend(
            self.form
                .fields
                .iter()
                .map(|f| (f.label.clone(), f.display_value())),
        );
        for field in OutputField::ALL {
            let value = match self.output.flag(field) {
                Some(true) => "yes".to_string(),
                Some(false) => "no".to_string(),
                None if field == OutputField::DatasetName => {
                    self.output.dataset_name.text.clone()
                }
                None => self.output.rename_pattern.text.clone(),
            };
            lines.push((field.label().to_string(), value));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::ImageEntry;
    use biomero_api::payload::WorkflowMetadata;

    fn wizard() -> Wizard {
        let metadata: WorkflowMetadata = serde_json::from_value(json!({
            "name": "cellpose",
            "workflow-version": "1.3.1",
            "inputs": [
                {"id": "cytomine_host", "type": "String"},
                {"id": "diameter", "name": "Diameter", "type": "Number", "default-value": 30},
                {"id": "model", "name": "Model", "type": "String", "optional": false}
            ]
        }))
        .unwrap();
        Wizard::new(Workflow::from_parts("cellpose".into(), metadata, None))
    }

    fn with_images(w: &mut Wizard) {
        w.datasets = vec!["dataset-1".into()];
        w.images.set_images(vec![
            ImageEntry {
                id: 5,
                name: "a.tif".into(),
                dataset: "dataset-1".into(),
            },
            ImageEntry {
                id: 6,
                name: "b.tif".into(),
                dataset: "dataset-1".into(),
            },
        ]);
    }

    #[test]
    fn test_input_guard() {
        let mut w = wizard();
        assert!(!w.next());
        assert_eq!(w.hint.as_deref(), Some("Select at least one image"));
        assert_eq!(w.step(), Some(WizardStep::Input));

        with_images(&mut w);
        assert!(w.next());
        assert_eq!(w.step(), Some(WizardStep::Parameters));
        assert!(w.hint.is_none());
    }

    #[test]
    fn test_parameter_and_output_guards() {
        let mut w = wizard();
        with_images(&mut w);
        w.next();

        assert!(!w.next());
        assert_eq!(w.hint.as_deref(), Some("Model is required"));
        w.form.fields[1].text = LineInput::with_text("cyto2");
        assert!(w.next());

        w.output.rename_pattern = LineInput::with_text("{original}_mask");
        assert!(!w.next());
        assert_eq!(w.step(), Some(WizardStep::Output));

        w.output.dataset_name = LineInput::with_text("results");
        assert!(w.next());
        assert_eq!(w.step(), Some(WizardStep::Review));
        assert!(!w.next(), "review is the last editing step");
    }

    #[test]
    fn test_rename_pattern_locked_without_dataset() {
        let mut options = OutputOptions::default();
        options.cursor = 5;
        assert!(options.current_text_mut().is_none());
        options.dataset_name = LineInput::with_text("out");
        assert!(options.current_text_mut().is_some());
        options.cursor = 0;
        assert!(options.toggle_current());
        assert!(!options.receive_email);
    }

    #[test]
    fn test_submit_only_from_review() {
        let mut w = wizard();
        with_images(&mut w);
        assert!(w.begin_submit().is_err());

        w.form.fields[1].text = LineInput::with_text("cyto2");
        w.next();
        w.next();
        w.next();
        let request = w.begin_submit().unwrap();
        assert_eq!(w.state, WizardState::Submitting);
        assert!(!w.back(), "no going back while submitting");

        assert_eq!(request.workflow_name, "cellpose");
        let p = &request.params;
        assert_eq!(p["IDs"], json!([5, 6]));
        assert_eq!(p["Data_Type"], json!("Image"));
        assert_eq!(p["diameter"], json!(30));
        assert_eq!(p["model"], json!("cyto2"));
        assert_eq!(p["receiveEmail"], json!(true));
        assert_eq!(p["attachToOriginalImages"], json!(false));
        assert_eq!(p["selectedDatasets"], json!([]));
        assert_eq!(p["renamePattern"], json!(""));
        assert_eq!(p["version"], json!("1.3.1"));
        assert!(!p.contains_key("cytomine_host"));
    }

    #[test]
    fn test_finish_and_retry() {
        let mut w = wizard();
        with_images(&mut w);
        w.form.fields[1].text = LineInput::with_text("cyto2");
        w.next();
        w.next();
        w.next();

        w.finish(Ok("ignored".into()));
        assert_eq!(w.step(), Some(WizardStep::Review));

        w.begin_submit().unwrap();
        w.finish(Err("Script not found".into()));
        assert_eq!(w.state, WizardState::Failed("Script not found".into()));
        assert!(w.is_finished());

        assert!(w.back());
        assert_eq!(w.step(), Some(WizardStep::Review));
        w.begin_submit().unwrap();
        w.finish(Ok("started".into()));
        assert_eq!(w.state, WizardState::Done("started".into()));
        assert!(!w.back());
    }
}
