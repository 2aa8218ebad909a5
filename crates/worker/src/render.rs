//! Renderer boundary: stage inputs, shell out, collect the artifact.
//!
//! The renderer is an external binary. Each attempt writes the task's
//! first frame and prompt file under the inputs directory, invokes the
//! binary, and reads the artifact it leaves under the outputs directory.
//! All three steps report as a [`WorkError`] string so the attempt's error
//! entry names what actually broke.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{info, instrument};

use motionforge_core::Task;
use motionforge_infra::{WorkError, WorkExecutor};

use crate::config::{Config, Device};

/// Inference settings baked into the renderer deployment.
const INFERENCE_CONFIG: &str = "configs/inference/inference_rest.yaml";

/// Prompt file the renderer expects, with the task's prompt text and the
/// staged first-frame path substituted in.
const PROMPT_TEMPLATE: &str = r#"
seeds: random

prompts:
  - "{prompt_text}"

n_prompts:
  - ""

path_to_first_frames:
  - "{input_path}"
"#;

/// Paths of one attempt's staged inputs.
#[derive(Debug)]
pub struct StagedInputs {
    pub image_path: PathBuf,
    pub prompt_path: PathBuf,
}

/// Stage a task's render inputs under `inputs_dir`.
///
/// Writes the decoded first frame as `{id}.png` and the rendered prompt
/// file as `{id}.prompt.txt`. Restaging on a retry overwrites both.
pub fn stage_inputs(inputs_dir: &Path, task: &Task) -> Result<StagedInputs, WorkError> {
    let image = STANDARD
        .decode(&task.payload.image_b64)
        .map_err(|e| WorkError::new(format!("first frame is not valid base64: {e}")))?;

    let image_path = inputs_dir.join(format!("{}.png", task.id));
    fs::write(&image_path, image)
        .map_err(|e| WorkError::new(format!("failed to write {}: {e}", image_path.display())))?;

    let prompt_path = inputs_dir.join(format!("{}.prompt.txt", task.id));
    let prompt_file = PROMPT_TEMPLATE
        .replace("{prompt_text}", &task.payload.prompt)
        .replace("{input_path}", &image_path.to_string_lossy());
    fs::write(&prompt_path, prompt_file)
        .map_err(|e| WorkError::new(format!("failed to write {}: {e}", prompt_path.display())))?;

    Ok(StagedInputs {
        image_path,
        prompt_path,
    })
}

/// Runs the external renderer, one task per call.
#[derive(Debug, Clone)]
pub struct RenderExecutor {
    render_cmd: String,
    device: Device,
    inputs_dir: PathBuf,
    outputs_dir: PathBuf,
}

impl RenderExecutor {
    pub fn new(config: &Config) -> Self {
        Self {
            render_cmd: config.render_cmd.clone(),
            device: config.device,
            inputs_dir: config.inputs_dir.clone(),
            outputs_dir: config.outputs_dir.clone(),
        }
    }
}

impl WorkExecutor for RenderExecutor {
    #[instrument(skip_all, fields(task_id = %task.id, device = %self.device))]
    fn execute(&self, task: &Task) -> Result<Vec<u8>, WorkError> {
        let staged = stage_inputs(&self.inputs_dir, task)?;

        info!(prompt_path = %staged.prompt_path.display(), "invoking renderer");
        let status = Command::new(&self.render_cmd)
            .arg("--inference-config")
            .arg(INFERENCE_CONFIG)
            .arg("--prompt-config")
            .arg(&staged.prompt_path)
            .arg("--format")
            .arg(task.payload.format.extension())
            .arg("--output-name")
            .arg(task.id.as_str())
            .arg("--output-folder")
            .arg(&self.outputs_dir)
            .arg("--device")
            .arg(self.device.as_str())
            .arg("--only-output-animation")
            .arg("--disable-metadata-in-animation-name")
            .status()
            .map_err(|e| {
                WorkError::new(format!("failed to spawn renderer {}: {e}", self.render_cmd))
            })?;

        if !status.success() {
            return Err(WorkError::new(format!("renderer exited with {status}")));
        }

        let artifact_path = self
            .outputs_dir
            .join(format!("{}.{}", task.id, task.payload.format.extension()));
        fs::read(&artifact_path).map_err(|e| {
            WorkError::new(format!(
                "renderer produced no output at {}: {e}",
                artifact_path.display()
            ))
        })
    }
}
