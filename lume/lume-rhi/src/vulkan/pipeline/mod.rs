mod graphics;

pub use graphics::VulkanGraphicsPipeline;
