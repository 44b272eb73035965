// ============================================================
// Layer 4 — Batchers
// ============================================================
// Implements Burn's Batcher trait to stack decoded images into
// NCHW tensors:
//
//   Vec<ScanItem>    → ScanBatch    { images [N,1,H,W], labels [N] }
//   Vec<TripletItem> → TripletBatch { anchors, positives, negatives [N,1,H,W] }
//
// Every image has the same H × W (the preprocessor enforces it),
// so stacking is a flatten + reshape.
//
// Reference: Burn Book §4 (Batcher)

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::data::{
    dataset::{ScanItem, TripletItem},
    preprocessor::ScanImage,
};

/// Stack images into a [N, 1, H, W] float tensor in [0, 1].
pub fn images_to_tensor<B: Backend>(images: &[&ScanImage], device: &B::Device) -> Tensor<B, 4> {
    let n = images.len();
    let (h, w) = images
        .first()
        .map(|img| (img.height, img.width))
        .unwrap_or((0, 0));

    let flat: Vec<f32> = images.iter().flat_map(|img| img.to_floats()).collect();
    Tensor::from_data(TensorData::new(flat, [n, 1, h, w]), device)
}

fn labels_to_tensor<B: Backend>(labels: impl Iterator<Item = usize>, device: &B::Device) -> Tensor<B, 1, Int> {
    let labels: Vec<i32> = labels.map(|l| l as i32).collect();
    Tensor::<B, 1, Int>::from_ints(labels.as_slice(), device)
}

// ─── Labelled images ──────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct ScanBatch<B: Backend> {
    /// [batch_size, 1, height, width]
    pub images: Tensor<B, 4>,
    /// Class indices (AD = 0, NC = 1) — [batch_size]
    pub labels: Tensor<B, 1, Int>,
}

#[derive(Clone, Debug)]
pub struct ScanBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> ScanBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<ScanItem, ScanBatch<B>> for ScanBatcher<B> {
    fn batch(&self, items: Vec<ScanItem>) -> ScanBatch<B> {
        let images: Vec<&ScanImage> = items.iter().map(|i| i.image.as_ref()).collect();
        ScanBatch {
            images: images_to_tensor(&images, &self.device),
            labels: labels_to_tensor(items.iter().map(|i| i.label.index()), &self.device),
        }
    }
}

// ─── Triplets ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TripletBatch<B: Backend> {
    pub anchors:   Tensor<B, 4>,
    pub positives: Tensor<B, 4>,
    pub negatives: Tensor<B, 4>,
}

#[derive(Clone, Debug)]
pub struct TripletBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> TripletBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<TripletItem, TripletBatch<B>> for TripletBatcher<B> {
    fn batch(&self, items: Vec<TripletItem>) -> TripletBatch<B> {
        let stack = |pick: fn(&TripletItem) -> &ScanImage| {
            let images: Vec<&ScanImage> = items.iter().map(pick).collect();
            images_to_tensor::<B>(&images, &self.device)
        };

        TripletBatch {
            anchors:   stack(|t| t.anchor.as_ref()),
            positives: stack(|t| t.positive.as_ref()),
            negatives: stack(|t| t.negative.as_ref()),
        }
    }
}
