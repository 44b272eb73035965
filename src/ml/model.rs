// ============================================================
// Layer 5 — Siamese Embedding Network
// ============================================================
// One convolutional tower, used three times per triplet:
//
//   [N,1,H,W] ─► ConvBlock × len(channels) ─► AvgPool 4×4
//             ─► Linear ─► ReLU ─► Dropout ─► Linear ─► L2 norm
//             ─► [N, embedding_dim]
//
// The classifier reuses the trained tower and puts a small MLP
// head on top of the embeddings.
//
// Reference: Burn Book §3 (Building Blocks)
//            Koch et al. (2015) Siamese Neural Networks

use burn::{
    module::AutodiffModule,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::{
        activation::{relu, softmax},
        backend::AutodiffBackend,
    },
};

/// Spatial size the last feature map is pooled to, whatever the input size.
const POOLED: usize = 4;
const NORM_EPS: f64 = 1e-12;

// ─── Embedding tower ──────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct EmbeddingNetConfig {
    /// Output channels of each conv stage; each stage halves H and W
    #[config(default = "vec![16, 32, 64, 128]")]
    pub channels:      Vec<usize>,
    #[config(default = 256)]
    pub hidden:        usize,
    #[config(default = 128)]
    pub embedding_dim: usize,
    #[config(default = 0.2)]
    pub dropout:       f64,
}

impl EmbeddingNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> EmbeddingNet<B> {
        let mut in_channels = 1;
        let blocks = self
            .channels
            .iter()
            .map(|&out| {
                let block = ConvBlock {
                    conv: Conv2dConfig::new([in_channels, out], [3, 3])
                        .with_padding(PaddingConfig2d::Explicit(1, 1))
                        .init(device),
                    norm: BatchNormConfig::new(out).init(device),
                    pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
                };
                in_channels = out;
                block
            })
            .collect();

        EmbeddingNet {
            blocks,
            pool:    AdaptiveAvgPool2dConfig::new([POOLED, POOLED]).init(),
            fc1:     LinearConfig::new(in_channels * POOLED * POOLED, self.hidden).init(device),
            fc2:     LinearConfig::new(self.hidden, self.embedding_dim).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// conv 3×3 → batch norm → ReLU → max-pool 2×2
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub norm: BatchNorm<B, 2>,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.norm.forward(self.conv.forward(x));
        self.pool.forward(relu(x))
    }
}

/// The convolutional tower mapping a [N, 1, H, W] batch to
/// L2-normalised [N, embedding_dim] embeddings.
#[derive(Module, Debug)]
pub struct EmbeddingNet<B: Backend> {
    pub blocks:  Vec<ConvBlock<B>>,
    pub pool:    AdaptiveAvgPool2d,
    pub fc1:     Linear<B>,
    pub fc2:     Linear<B>,
    pub dropout: Dropout,
}

impl<B: Backend> EmbeddingNet<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.pool.forward(x).flatten::<2>(1, 3);
        let x = self.dropout.forward(relu(self.fc1.forward(x)));
        l2_normalize(self.fc2.forward(x))
    }
}

pub fn l2_normalize<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let norm = x.clone().powf_scalar(2.0).sum_dim(1).sqrt().clamp_min(NORM_EPS);
    x / norm
}

// ─── Siamese wrapper ──────────────────────────────────────────────────────────

/// Three "towers" that are one tower: every input goes through the
/// same `EmbeddingNet`, so the weights are shared by construction.
#[derive(Module, Debug)]
pub struct SiameseNet<B: Backend> {
    pub tower: EmbeddingNet<B>,
}

pub struct TripletEmbeddings<B: Backend> {
    pub anchor:   Tensor<B, 2>,
    pub positive: Tensor<B, 2>,
    pub negative: Tensor<B, 2>,
}

impl<B: Backend> SiameseNet<B> {
    pub fn new(tower: EmbeddingNet<B>) -> Self {
        Self { tower }
    }

    pub fn forward_triplet(
        &self,
        anchor:   Tensor<B, 4>,
        positive: Tensor<B, 4>,
        negative: Tensor<B, 4>,
    ) -> TripletEmbeddings<B> {
        TripletEmbeddings {
            anchor:   self.tower.forward(anchor),
            positive: self.tower.forward(positive),
            negative: self.tower.forward(negative),
        }
    }
}

// ─── Classifier ───────────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct ClassifierHeadConfig {
    pub embedding_dim: usize,
    #[config(default = 64)]
    pub hidden:        usize,
    #[config(default = 2)]
    pub num_classes:   usize,
    #[config(default = 0.2)]
    pub dropout:       f64,
}

impl ClassifierHeadConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ClassifierHead<B> {
        ClassifierHead {
            fc1:     LinearConfig::new(self.embedding_dim, self.hidden).init(device),
            fc2:     LinearConfig::new(self.hidden, self.num_classes).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    pub fc1:     Linear<B>,
    pub fc2:     Linear<B>,
    pub dropout: Dropout,
}

impl<B: Backend> ClassifierHead<B> {
    /// embeddings: [N, embedding_dim] → logits: [N, num_classes]
    pub fn forward(&self, embeddings: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.dropout.forward(relu(self.fc1.forward(embeddings)));
        self.fc2.forward(x)
    }
}

/// Trained tower + classification head.
#[derive(Module, Debug)]
pub struct EmbeddingClassifier<B: Backend> {
    pub tower: EmbeddingNet<B>,
    pub head:  ClassifierHead<B>,
}

impl<B: Backend> EmbeddingClassifier<B> {
    pub fn new(tower: EmbeddingNet<B>, head: ClassifierHead<B>) -> Self {
        Self { tower, head }
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head.forward(self.tower.forward(images))
    }

    /// Class probabilities, [N, num_classes]
    pub fn probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }
}

impl<B: AutodiffBackend> EmbeddingClassifier<B> {
    /// Training-time logits. With `freeze_tower` the tower runs in
    /// inference mode outside the graph, so only the head gets gradients.
    pub fn forward_train(&self, images: Tensor<B, 4>, freeze_tower: bool) -> Tensor<B, 2> {
        let embeddings = if freeze_tower {
            Tensor::from_inner(self.tower.valid().forward(images.inner()))
        } else {
            self.tower.forward(images)
        };
        self.head.forward(embeddings)
    }
}
