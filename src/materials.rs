//! Acoustic material table.
//!
//! Maps named surface materials to scalar absorption coefficients in
//! `[0, 1]`: 0 is a fully reflective boundary, values toward 1 are
//! increasingly absorptive.

/// Named surface materials with measured absorption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Material {
    /// No surface at all; boundary admittance stays fully reflective.
    FreeSpace,
    /// Generic mid-absorption surface.
    #[default]
    Default,
    BrickUnglazed,
    BrickPainted,
    ConcreteRough,
    ConcreteBlockPainted,
    GlassHeavy,
    GlassWindow,
    TileGlazed,
    PlasterBrick,
    PlasterConcreteBlock,
    WoodPlywoodPanel,
    Steel,
    WoodPanel,
    ConcreteBlockCoarse,
    DraperyLight,
    DraperyMedium,
    DraperyHeavy,
    FiberboardShreddedWood,
    ConcretePainted,
    Wood,
    WoodVarnished,
    CarpetHeavy,
    Gravel,
    Grass,
    SnowFresh,
    SoilRough,
    WoodTree,
    WaterSurface,
    Concrete,
    Glass,
    Marble,
    Drapery,
    Cloth,
    Awning,
    Foliage,
    Metal,
    Ice,
}

impl Material {
    /// Absorption coefficient for this material.
    pub fn absorption(self) -> f32 {
        match self {
            Material::FreeSpace => 0.0,
            Material::Default => 0.989_949_5,
            Material::BrickUnglazed => 0.979_795_9,
            Material::BrickPainted => 0.989_949_5,
            Material::ConcreteRough => 0.969_536_0,
            Material::ConcreteBlockPainted => 0.964_365_1,
            Material::GlassHeavy => 0.984_885_8,
            Material::GlassWindow => 0.938_083_2,
            Material::TileGlazed => 0.994_987_4,
            Material::PlasterBrick => 0.984_885_8,
            Material::PlasterConcreteBlock => 0.974_679_4,
            Material::WoodPlywoodPanel => 0.948_683_3,
            Material::Steel => 0.948_683_3,
            Material::WoodPanel => 0.953_939_2,
            Material::ConcreteBlockCoarse => 0.806_225_8,
            Material::DraperyLight => 0.921_954_4,
            Material::DraperyMedium => 0.670_820_4,
            Material::DraperyHeavy => 0.632_455_5,
            Material::FiberboardShreddedWood => 0.632_455_5,
            Material::ConcretePainted => 0.989_949_5,
            Material::Wood => 0.964_365_1,
            Material::WoodVarnished => 0.984_885_8,
            Material::CarpetHeavy => 0.806_225_8,
            Material::Gravel => 0.547_722_6,
            Material::Grass => 0.547_722_6,
            Material::SnowFresh => 0.316_227_8,
            Material::SoilRough => 0.741_619_8,
            Material::WoodTree => 0.911_043_4,
            Material::WaterSurface => 0.994_987_4,
            Material::Concrete => 0.979_795_9,
            Material::Glass => 0.969_536_0,
            Material::Marble => 0.994_987_4,
            Material::Drapery => 0.921_954_4,
            Material::Cloth => 0.921_954_4,
            Material::Awning => 0.921_954_4,
            Material::Foliage => 0.911_043_4,
            Material::Metal => 0.948_683_3,
            Material::Ice => 0.994_987_4,
        }
    }
}
