/// debug label 使用的颜色
pub struct LabelColor;

impl LabelColor {
    pub const COLOR_CMD: glam::Vec4 = glam::Vec4::new(0.4, 0.4, 0.4, 1.0);
    pub const COLOR_PASS: glam::Vec4 = glam::Vec4::new(0.2, 0.6, 0.2, 1.0);
    pub const COLOR_NODE: glam::Vec4 = glam::Vec4::new(0.2, 0.4, 0.8, 1.0);
    pub const COLOR_STAGE: glam::Vec4 = glam::Vec4::new(0.8, 0.6, 0.2, 1.0);
}
