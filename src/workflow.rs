//! The ComfyUI job graph submitted with every face-swap request.
//!
//! Stage one swaps the face with a Qwen image-edit checkpoint, stage two runs
//! a light Z-Image Turbo pass over the result for skin texture. The graph is
//! fixed; only the prompt and the two sampler seeds vary per request.

use rand::Rng;
use serde::{Serialize, Serializer};

/// Prompt used when the caller leaves the prompt empty.
pub const DEFAULT_PROMPT: &str = "replace the face and hair in image 2 with the exact face and hair from image 1, perfect face swap, identical facial features bone structure skin texture skin tone expression eyes nose mouth lips makeup exact match, transfer precise dark hair tone highlights lowlights, long hair length style volume parting shine exact copy from image 1, strictly preserve 100% the head angle orientation tilt rotation direction gaze eye position from image 1, keep everything else 100% unchanged from image 2: pose body clothing background lighting shadows proportions environment, seamless neck hairline blend no deformation no artifacts ultra realistic high detail sharp focus natural skin pores no extra faces";

/// File names the `LoadImage` stages read; uploads are attached under these names.
pub const SOURCE_IMAGE_NAME: &str = "source_face.jpg";
pub const TARGET_IMAGE_NAME: &str = "target_image.jpg";

/// Seeds are drawn from `[0, SEED_CEILING)`.
pub const SEED_CEILING: u64 = 100_000_000_000_000;

const REFINE_PROMPT: &str = "realistic skin texture, detailed pores, natural imperfections, film grain\nNegative: plastic skin, smooth plastic, airbrushed";

/// Sampler seeds for the swap and refinement passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Seeds {
    pub swap: u64,
    pub refine: u64,
}

impl Seeds {
    pub fn random() -> Self {
        let mut rng = rand::rng();
        Self {
            swap: rng.random_range(0..SEED_CEILING),
            refine: rng.random_range(0..SEED_CEILING),
        }
    }
}

/// `["<stage id>", <output slot>]` on the wire.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct Link(pub &'static str, pub u32);

#[derive(Debug, Serialize)]
pub struct Stage<'a> {
    pub inputs: Inputs<'a>,
    pub class_type: &'static str,
    #[serde(rename = "_meta")]
    pub meta: Meta,
}

#[derive(Debug, Serialize)]
pub struct Meta {
    pub title: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Sampler {
    pub seed: u64,
    pub steps: u32,
    pub cfg: f64,
    pub sampler_name: &'static str,
    pub scheduler: &'static str,
    pub denoise: f64,
    pub model: Link,
    pub positive: Link,
    pub negative: Link,
    pub latent_image: Link,
}

/// Inputs of each node class used by the graph.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Inputs<'a> {
    CheckpointLoader {
        ckpt_name: &'static str,
    },
    KSampler(Sampler),
    QwenEdit {
        prompt: &'a str,
        clip: Link,
        vae: Link,
        #[serde(skip_serializing_if = "Option::is_none")]
        image1: Option<Link>,
        #[serde(skip_serializing_if = "Option::is_none")]
        image2: Option<Link>,
    },
    VaeDecode {
        samples: Link,
        vae: Link,
    },
    LoadImage {
        image: &'static str,
    },
    EmptyLatent {
        width: u32,
        height: u32,
        batch_size: u32,
    },
    ResizeByLongerEdge {
        images: Link,
        max_length: u32,
    },
    ClipLoader {
        clip_name: &'static str,
        #[serde(rename = "type")]
        kind: &'static str,
        device: &'static str,
    },
    ConditioningZeroOut {
        conditioning: Link,
    },
    UnetLoader {
        unet_name: &'static str,
        weight_dtype: &'static str,
    },
    VaeLoader {
        vae_name: &'static str,
    },
    VaeEncode {
        pixels: Link,
        vae: Link,
    },
    ClipTextEncode {
        text: &'static str,
        clip: Link,
    },
    SaveImage {
        filename_prefix: &'static str,
        images: Link,
    },
}

impl Inputs<'_> {
    pub fn class_type(&self) -> &'static str {
        match self {
            Inputs::CheckpointLoader { .. } => "CheckpointLoaderSimple",
            Inputs::KSampler(_) => "KSampler",
            Inputs::QwenEdit { .. } => "TextEncodeQwenImageEditPlus",
            Inputs::VaeDecode { .. } => "VAEDecode",
            Inputs::LoadImage { .. } => "LoadImage",
            Inputs::EmptyLatent { .. } => "EmptyLatentImage",
            Inputs::ResizeByLongerEdge { .. } => "ResizeImagesByLongerEdge",
            Inputs::ClipLoader { .. } => "CLIPLoader",
            Inputs::ConditioningZeroOut { .. } => "ConditioningZeroOut",
            Inputs::UnetLoader { .. } => "UNETLoader",
            Inputs::VaeLoader { .. } => "VAELoader",
            Inputs::VaeEncode { .. } => "VAEEncode",
            Inputs::ClipTextEncode { .. } => "CLIPTextEncode",
            Inputs::SaveImage { .. } => "SaveImage",
        }
    }
}

fn stage<'a>(id: &'static str, title: &'static str, inputs: Inputs<'a>) -> (&'static str, Stage<'a>) {
    let class_type = inputs.class_type();
    (
        id,
        Stage {
            inputs,
            class_type,
            meta: Meta { title },
        },
    )
}

/// The face-swap job description. Serializes to ComfyUI's API graph format.
#[derive(Clone, Debug)]
pub struct Workflow {
    prompt: String,
    seeds: Seeds,
}

impl Workflow {
    /// Only an empty prompt is replaced by [`DEFAULT_PROMPT`]; any other text,
    /// whitespace included, is sent as typed.
    pub fn new(prompt: &str, seeds: Seeds) -> Self {
        let prompt = if prompt.is_empty() {
            DEFAULT_PROMPT
        } else {
            prompt
        };
        Self {
            prompt: prompt.to_string(),
            seeds,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn seeds(&self) -> Seeds {
        self.seeds
    }

    pub fn stages(&self) -> Vec<(&'static str, Stage<'_>)> {
        vec![
            // Face swap
            stage(
                "1",
                "Load Checkpoint",
                Inputs::CheckpointLoader {
                    ckpt_name: "Qwen-Rapid-AIO-NSFW-v21.safetensors",
                },
            ),
            stage(
                "2",
                "KSampler - Face Swap",
                Inputs::KSampler(Sampler {
                    seed: self.seeds.swap,
                    steps: 4,
                    cfg: 1.0,
                    sampler_name: "sa_solver",
                    scheduler: "beta",
                    denoise: 0.87,
                    model: Link("1", 0),
                    positive: Link("3", 0),
                    negative: Link("4", 0),
                    latent_image: Link("9", 0),
                }),
            ),
            stage(
                "3",
                "TextEncodeQwenImageEditPlus Input Prompt",
                Inputs::QwenEdit {
                    prompt: &self.prompt,
                    clip: Link("1", 1),
                    vae: Link("1", 2),
                    image1: Some(Link("7", 0)),
                    image2: Some(Link("8", 0)),
                },
            ),
            stage(
                "4",
                "TextEncodeQwenImageEditPlus Negative",
                Inputs::QwenEdit {
                    prompt: "\n",
                    clip: Link("1", 1),
                    vae: Link("1", 2),
                    image1: None,
                    image2: None,
                },
            ),
            stage(
                "5",
                "VAE Decode - Face Swap Output",
                Inputs::VaeDecode {
                    samples: Link("2", 0),
                    vae: Link("1", 2),
                },
            ),
            stage(
                "7",
                "Source Face Image",
                Inputs::LoadImage {
                    image: SOURCE_IMAGE_NAME,
                },
            ),
            stage(
                "8",
                "Target Image",
                Inputs::LoadImage {
                    image: TARGET_IMAGE_NAME,
                },
            ),
            stage(
                "9",
                "Final Image Size",
                Inputs::EmptyLatent {
                    width: 1200,
                    height: 2000,
                    batch_size: 1,
                },
            ),
            stage(
                "18",
                "Resize to 2000px",
                Inputs::ResizeByLongerEdge {
                    images: Link("5", 0),
                    max_length: 2000,
                },
            ),
            // Refinement
            stage(
                "11",
                "Load CLIP (Z-Image Turbo)",
                Inputs::ClipLoader {
                    clip_name: "qwen_3_4b.safetensors",
                    kind: "lumina2",
                    device: "default",
                },
            ),
            stage(
                "12",
                "ConditioningZeroOut",
                Inputs::ConditioningZeroOut {
                    conditioning: Link("20", 0),
                },
            ),
            stage(
                "14",
                "Load Diffusion Model (Z-Image Turbo)",
                Inputs::UnetLoader {
                    unet_name: "z_image_turbo_bf16.safetensors",
                    weight_dtype: "default",
                },
            ),
            stage(
                "16",
                "Load VAE (Z-Image Turbo)",
                Inputs::VaeLoader {
                    vae_name: "ae.safetensors",
                },
            ),
            stage(
                "19",
                "VAE Encode - For Refinement",
                Inputs::VaeEncode {
                    pixels: Link("18", 0),
                    vae: Link("16", 0),
                },
            ),
            stage(
                "20",
                "CLIP Text Encode - Refinement Prompt",
                Inputs::ClipTextEncode {
                    text: REFINE_PROMPT,
                    clip: Link("11", 0),
                },
            ),
            stage(
                "17",
                "KSampler - Z-Image Turbo Refinement",
                Inputs::KSampler(Sampler {
                    seed: self.seeds.refine,
                    steps: 4,
                    cfg: 1.0,
                    sampler_name: "res_multistep",
                    scheduler: "simple",
                    denoise: 0.15,
                    model: Link("14", 0),
                    positive: Link("20", 0),
                    negative: Link("12", 0),
                    latent_image: Link("19", 0),
                }),
            ),
            stage(
                "13",
                "VAE Decode - Final Output",
                Inputs::VaeDecode {
                    samples: Link("17", 0),
                    vae: Link("16", 0),
                },
            ),
            // Output
            stage(
                "10",
                "Save Image",
                Inputs::SaveImage {
                    filename_prefix: "runpod_api_output",
                    images: Link("13", 0),
                },
            ),
        ]
    }
}

impl Serialize for Workflow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.stages())
    }
}
