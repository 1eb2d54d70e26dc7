use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::relu,
};

// #[derive(Config)] brings its own Clone and serde impls;
// deriving them again conflicts.
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    pub num_features: usize,
    #[config(default = 32)]
    pub hidden_size:  usize,
    #[config(default = 2)]
    pub num_classes:  usize,
}

impl ClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Classifier<B> {
        let hidden = LinearConfig::new(self.num_features, self.hidden_size).init(device);
        let output = LinearConfig::new(self.hidden_size, self.num_classes).init(device);
        Classifier { hidden, output }
    }
}

/// Linear → relu → Linear
#[derive(Module, Debug)]
pub struct Classifier<B: Backend> {
    pub hidden: Linear<B>,
    pub output: Linear<B>,
}

impl<B: Backend> Classifier<B> {
    /// features: [batch, num_features] → logits: [batch, num_classes]
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        self.output.forward(relu(self.hidden.forward(features)))
    }
}
