//! User-facing texts shown on the form card.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    ZhCn,
    En,
}

impl Locale {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "zh_CN" => Some(Self::ZhCn),
            "en" => Some(Self::En),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FormMessages {
    locale: Locale,
}

impl FormMessages {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn missing_required(&self, labels: &[String]) -> String {
        let labels = labels.join(", ");
        match self.locale {
            Locale::ZhCn => format!("请填写必填项「{labels}」"),
            Locale::En => format!("Please fill in the required fields: {labels}"),
        }
    }

    pub fn invalid_type(&self, field_type: &str) -> String {
        match self.locale {
            Locale::ZhCn => format!("无效的表单类型「{field_type}」"),
            Locale::En => format!("Invalid form field type '{field_type}'"),
        }
    }

    pub fn service_error(&self) -> &'static str {
        match self.locale {
            Locale::ZhCn => "服务异常",
            Locale::En => "Service error",
        }
    }

    /// Button text once the form is locked.
    pub fn submitted(&self) -> &'static str {
        match self.locale {
            Locale::ZhCn => "已提交",
            Locale::En => "Submitted",
        }
    }

    /// Button text of a fresh form.
    pub fn submit(&self) -> &'static str {
        match self.locale {
            Locale::ZhCn => "提交",
            Locale::En => "Submit",
        }
    }
}
