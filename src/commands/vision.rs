//! Face and pattern recognition.
//!
//! Detection results arrive as small JSON objects in the string slots of the
//! completion, e.g. `{"face0":[x, y, w, h, score]}`. Each object holds one
//! entry; its key labels the detection and its array carries the numbers.
//!
//! Later calls address a detection by its index in the most recent result,
//! so [`FaceDetection`] and [`PatternDetection`] remember how many things
//! they last saw.

use super::{required_param, switch, OpCode, Submitter, SWITCH_ON};
use crate::error::{GomerError, GomerResult};
use crate::validation::{in_range, one_of, text_shorter_than};
use gomer_core::{Dispatcher, OperationDescriptor, ResultFields};
use regex::Regex;
use serde_json::{Map, Value};
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::LazyLock;

/// Image source for detection: the live camera.
const SOURCE_CAMERA: i64 = 100;
/// Minimum detection score sent with a detection request.
const MIN_SCORE: i64 = 0;
const DETECTION_SIZE: RangeInclusive<i64> = 10..=300;
const FACE_VALUES: usize = 4;
const PATTERN_VALUES: usize = 8;
/// Longest name accepted for a face or a feature file.
const MAX_NAME_LEN: usize = 10;
/// Faces the robot remembers; registering more evicts the oldest.
const MAX_REGISTERED_FACES: usize = 10;
const PATTERN_SIZES: RangeInclusive<u32> = 30..=50;

static PATTERN_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^sdk1_(\d{2})x(\d{2})_\w{1,10}\.jpg$").ok());

/// One detected face or pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Label assigned by the robot, e.g. `face0`.
    pub label: String,
    /// Leading numbers of the detection: the bounding box for faces, corner
    /// points for patterns.
    pub values: Vec<f64>,
}

/// First entry of a single-entry JSON object.
fn first_entry(raw: &str) -> GomerResult<Option<(String, Value)>> {
    let object: Map<String, Value> = serde_json::from_str(raw)?;
    Ok(object.into_iter().next())
}

fn numbers(value: &Value) -> Vec<f64> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default()
}

fn detections(fields: &ResultFields, keep: usize) -> GomerResult<Vec<Detection>> {
    let mut found = Vec::new();
    for raw in fields.texts() {
        if let Some((label, value)) = first_entry(raw)? {
            let mut values = numbers(&value);
            values.truncate(keep);
            found.push(Detection { label, values });
        }
    }
    Ok(found)
}

fn check_index(index: usize, detected: usize, what: &str) -> GomerResult<String> {
    if detected == 0 {
        return Err(GomerError::InvalidParameter(format!(
            "no {} detected yet",
            what
        )));
    }
    if index >= detected {
        return Err(GomerError::InvalidParameter(format!(
            "index must be in 0..={}, got {}",
            detected - 1,
            index
        )));
    }
    Ok(format!("{}{}", what, index))
}

fn check_name<'a>(field: &str, name: &'a str) -> GomerResult<&'a str> {
    text_shorter_than(field, name, MAX_NAME_LEN + 1)
}

// =============================================================================
// Faces
// =============================================================================

/// Face detection and the robot's registry of known faces.
#[derive(Debug, Clone)]
pub struct FaceDetection {
    submitter: Submitter,
    show: bool,
    detected: usize,
    registered: Vec<String>,
}

impl FaceDetection {
    /// Build the face client and fetch the names the robot already knows.
    pub(crate) async fn load(dispatcher: Dispatcher) -> GomerResult<Self> {
        let mut faces = Self {
            submitter: Submitter::new(dispatcher, None),
            show: true,
            detected: 0,
            registered: Vec::new(),
        };
        faces.refresh_face_list().await?;
        Ok(faces)
    }

    /// Whether detections are drawn on the robot's screen.
    pub fn set_show(&mut self, show: bool) {
        self.show = show;
    }

    fn show_code(&self) -> i64 {
        switch(self.show)
    }

    fn descriptor(&self, op: OpCode) -> OperationDescriptor {
        self.submitter.descriptor(op)
    }

    /// Detect faces between `min_size` and `max_size` pixels (both 10..=300).
    pub async fn detect(&mut self, min_size: i64, max_size: i64) -> GomerResult<Vec<Detection>> {
        let descriptor = self
            .descriptor(OpCode::DetectFace)
            .param(1, SOURCE_CAMERA)
            .param(2, in_range("min_size", min_size, DETECTION_SIZE)?)
            .param(3, in_range("max_size", max_size, DETECTION_SIZE)?)
            .param(4, MIN_SCORE)
            .param(5, self.show_code());
        let fields = self.submitter.query(descriptor).await?;
        let faces = detections(&fields, FACE_VALUES)?;
        self.detected = faces.len();
        tracing::info!(faces = self.detected, "Face detection finished");
        Ok(faces)
    }

    /// Landmark points of detected face `index`, as `[x, y]` pairs.
    pub async fn feature(&self, index: usize) -> GomerResult<Option<Vec<[f64; 2]>>> {
        let label = check_index(index, self.detected, "face")?;
        let descriptor = self
            .descriptor(OpCode::GetFaceFeature)
            .param(5, self.show_code())
            .text(1, label);
        let fields = self.submitter.query(descriptor).await?;
        let Some(raw) = fields.get_text(1) else {
            return Ok(None);
        };
        Ok(first_entry(raw)?.map(|(_, value)| {
            numbers(&value)
                .chunks_exact(2)
                .map(|pair| [pair[0], pair[1]])
                .collect()
        }))
    }

    /// Name of the registered person matching detected face `index`.
    pub async fn name(&self, index: usize) -> GomerResult<Option<String>> {
        let label = check_index(index, self.detected, "face")?;
        let descriptor = self
            .descriptor(OpCode::GetName)
            .param(5, self.show_code())
            .text(1, label);
        let fields = self.submitter.query(descriptor).await?;
        Ok(fields.get_text(1).map(str::to_string))
    }

    /// Register detected face `index` under `name`.
    ///
    /// Re-registering a name replaces it. When the registry is full the
    /// oldest name is deleted first.
    pub async fn register(&mut self, index: usize, name: &str) -> GomerResult<()> {
        let label = check_index(index, self.detected, "face")?;
        let name = check_name("name", name)?;

        if self.registered.iter().any(|known| known == name) {
            self.delete(name).await?;
        } else if self.registered.len() >= MAX_REGISTERED_FACES {
            let oldest = self.registered[0].clone();
            self.delete(&oldest).await?;
        }

        let descriptor = self
            .descriptor(OpCode::RegisterFace)
            .text(1, label)
            .text(2, name);
        self.submitter.query(descriptor).await?;
        self.registered.push(name.to_string());
        Ok(())
    }

    /// Save the features of detected face `index` to `filename` on the robot.
    pub async fn save_feature_file(&self, index: usize, filename: &str) -> GomerResult<()> {
        let label = check_index(index, self.detected, "face")?;
        let descriptor = self
            .descriptor(OpCode::GetFeatureFile)
            .text(1, label)
            .text(2, check_name("filename", filename)?);
        self.submitter.query(descriptor).await?;
        Ok(())
    }

    /// Similarity score between two saved feature files.
    pub async fn similarity(&self, first: &str, second: &str) -> GomerResult<i64> {
        let descriptor = self
            .descriptor(OpCode::GetSimilarity)
            .text(1, first)
            .text(2, second);
        let fields = self.submitter.query(descriptor).await?;
        required_param(&fields, 1)
    }

    pub async fn rename(&mut self, name: &str, new_name: &str) -> GomerResult<()> {
        let new_name = check_name("new_name", new_name)?;
        let descriptor = self
            .descriptor(OpCode::RenameFace)
            .text(1, name)
            .text(2, new_name);
        self.submitter.query(descriptor).await?;
        for known in self.registered.iter_mut().filter(|known| *known == name) {
            *known = new_name.to_string();
        }
        Ok(())
    }

    /// Names registered on the robot, oldest first.
    pub fn registered(&self) -> &[String] {
        &self.registered
    }

    /// Re-read the registered names from the robot.
    pub async fn refresh_face_list(&mut self) -> GomerResult<&[String]> {
        let descriptor = self.descriptor(OpCode::GetFaceList);
        let fields = self.submitter.query(descriptor).await?;
        self.registered = match fields.get_text(1) {
            Some(raw) => first_entry(raw)?
                .and_then(|(_, value)| value.as_array().cloned())
                .unwrap_or_default()
                .iter()
                .filter_map(|name| name.as_str().map(str::to_string))
                .collect(),
            None => Vec::new(),
        };
        Ok(&self.registered)
    }

    /// Forget a registered face.
    pub async fn delete(&mut self, name: &str) -> GomerResult<()> {
        if !self.registered.iter().any(|known| known == name) {
            return Err(GomerError::InvalidParameter(format!(
                "face '{}' is not registered",
                name
            )));
        }
        let descriptor = self.descriptor(OpCode::DeleteFace).text(1, name);
        self.submitter.query(descriptor).await?;
        self.registered.retain(|known| known != name);
        Ok(())
    }
}

// =============================================================================
// Patterns
// =============================================================================

/// Pattern family to search for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatternSet {
    #[default]
    All,
    Number,
    Letter,
    Animal,
    Custom,
}

impl PatternSet {
    pub fn as_str(self) -> &'static str {
        match self {
            PatternSet::All => "all",
            PatternSet::Number => "number",
            PatternSet::Letter => "letter",
            PatternSet::Animal => "animal",
            PatternSet::Custom => "custom",
        }
    }
}

impl FromStr for PatternSet {
    type Err = GomerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match one_of("pattern set", s, &["all", "number", "letter", "animal", "custom"])? {
            "number" => Ok(PatternSet::Number),
            "letter" => Ok(PatternSet::Letter),
            "animal" => Ok(PatternSet::Animal),
            "custom" => Ok(PatternSet::Custom),
            _ => Ok(PatternSet::All),
        }
    }
}

/// Checks a custom pattern file name: `sdk1_<n>x<n>_<name>.jpg` with a square
/// size between 30 and 50 and a name of up to 10 word characters.
pub fn check_pattern_name(name: &str) -> GomerResult<&str> {
    let invalid = || {
        GomerError::InvalidParameter(format!(
            "pattern name '{}' must look like sdk1_<size>x<size>_<name>.jpg with 30 <= size <= 50",
            name
        ))
    };
    let captures = PATTERN_NAME
        .as_ref()
        .and_then(|re| re.captures(name))
        .ok_or_else(invalid)?;
    let width: u32 = captures[1].parse().map_err(|_| invalid())?;
    let height: u32 = captures[2].parse().map_err(|_| invalid())?;
    if width != height || !PATTERN_SIZES.contains(&width) {
        return Err(invalid());
    }
    Ok(name)
}

/// Pattern detection and custom pattern management.
#[derive(Debug, Clone)]
pub struct PatternDetection {
    submitter: Submitter,
    show: bool,
    detected: usize,
}

impl PatternDetection {
    pub(crate) fn new(dispatcher: Dispatcher) -> Self {
        Self {
            submitter: Submitter::new(dispatcher, None),
            show: true,
            detected: 0,
        }
    }

    pub fn set_show(&mut self, show: bool) {
        self.show = show;
    }

    fn show_code(&self) -> i64 {
        switch(self.show)
    }

    /// Detect patterns of `set` between `min_size` and `max_size` pixels.
    pub async fn detect(
        &mut self,
        min_size: i64,
        max_size: i64,
        set: PatternSet,
    ) -> GomerResult<Vec<Detection>> {
        let min_size = in_range("min_size", min_size, DETECTION_SIZE)?;
        let max_size = in_range("max_size", max_size, DETECTION_SIZE)?;
        if min_size >= max_size {
            return Err(GomerError::InvalidParameter(format!(
                "min_size must be below max_size, got {} >= {}",
                min_size, max_size
            )));
        }

        let descriptor = self
            .submitter
            .descriptor(OpCode::DetectPattern)
            .param(1, SOURCE_CAMERA)
            .param(2, min_size)
            .param(3, max_size)
            .param(4, MIN_SCORE)
            .param(5, self.show_code())
            .text(2, set.as_str());
        let fields = self.submitter.query(descriptor).await?;
        let patterns = detections(&fields, PATTERN_VALUES)?;
        self.detected = patterns.len();
        tracing::info!(patterns = self.detected, set = set.as_str(), "Pattern detection finished");
        Ok(patterns)
    }

    /// Teach the robot a custom pattern from an image file already on it.
    pub async fn add(&self, name: &str) -> GomerResult<()> {
        let descriptor = self
            .submitter
            .descriptor(OpCode::AddPattern)
            .text(1, check_pattern_name(name)?);
        self.submitter.query(descriptor).await?;
        Ok(())
    }

    /// Custom patterns known to the robot.
    pub async fn custom_patterns(&self) -> GomerResult<Vec<Value>> {
        let descriptor = self.submitter.descriptor(OpCode::GetPatternList);
        let fields = self.submitter.query(descriptor).await?;
        match fields.get_text(1) {
            Some(raw) => {
                let object: Map<String, Value> = serde_json::from_str(raw)?;
                Ok(object.into_iter().map(|(_, value)| value).collect())
            }
            None => Ok(Vec::new()),
        }
    }

    /// Location of detected pattern `index`.
    pub async fn location(&self, index: usize) -> GomerResult<Option<Vec<f64>>> {
        let label = check_index(index, self.detected, "pattern")?;
        let descriptor = self
            .submitter
            .descriptor(OpCode::GetPatternLocation)
            .param(5, self.show_code())
            .text(1, label);
        let fields = self.submitter.query(descriptor).await?;
        match fields.get_text(1) {
            Some(raw) => Ok(first_entry(raw)?.map(|(_, value)| numbers(&value))),
            None => Ok(None),
        }
    }

    /// Ask the robot for the next step toward `pattern`, ending `distance`
    /// away from it. Nothing moves; see [`crate::Robot::move_to_pattern`].
    ///
    /// `None` means the robot has no further step to offer.
    pub async fn approach_step(
        &self,
        pattern: &str,
        distance: i64,
    ) -> GomerResult<Option<ApproachStep>> {
        let descriptor = self
            .submitter
            .descriptor(OpCode::MoveToPattern)
            .param(1, distance)
            .text(1, text_shorter_than("pattern", pattern, 64)?);
        let fields = self.submitter.query(descriptor).await?;
        if fields.get_param(1) == Some(SWITCH_ON) {
            return Ok(None);
        }
        let head = required_param(&fields, 2)?;
        Ok(Some(ApproachStep {
            head: (head != HEAD_UNCHANGED).then_some(head),
            turn: required_param(&fields, 3)?,
            advance: required_param(&fields, 4)?,
            final_turn: required_param(&fields, 5)?,
        }))
    }
}

/// Head angle the robot reports when the head should stay where it is.
const HEAD_UNCHANGED: i64 = 255;

/// One correction toward a pattern, applied in field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApproachStep {
    /// Head angle to move to, if any.
    pub head: Option<i64>,
    /// Degrees to turn before moving.
    pub turn: i64,
    /// Distance to move straight.
    pub advance: i64,
    /// Degrees to turn after moving.
    pub final_turn: i64,
}
