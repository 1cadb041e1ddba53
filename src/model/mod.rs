mod conv;
mod conv_norm;
mod discriminator;
pub(crate) mod misc;
mod network;
mod norm;
mod resnet_block;
mod resnet_generator;
mod scale_block;
mod stage;
mod unet;
mod weight_init;

pub use conv::*;
pub use conv_norm::*;
pub use discriminator::*;
pub use misc::*;
pub use network::*;
pub use norm::*;
pub use resnet_block::*;
pub use resnet_generator::*;
pub use scale_block::*;
pub use stage::*;
pub use unet::*;
pub use weight_init::*;
